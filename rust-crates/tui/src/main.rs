use color_eyre::eyre::{
    Result,
    eyre,
};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

mod client;
mod ui;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: boxoffice --contract <address> [--fuji | --local] [--rpc-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>] [--ledger-path <path>]\n\
         \n\
         Flags:\n\
           --contract <address> TicketSale contract address (0x-prefixed)\n\
           --fuji               Connect to Avalanche Fuji (default RPC {})\n\
           --local              Connect to a local node (default RPC {})\n\
           --rpc-url <url>      Override the RPC URL for the selected network\n\
           --wallet <name>      Keystore file to unlock for purchases\n\
           --wallet-dir <path>  Override keystore directory (defaults to ~/.boxoffice/wallets)\n\
           --ledger-path <path> Override the local ticket cache file",
        client::DEFAULT_FUJI_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Fuji,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut contract: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut ledger_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fuji" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --fuji/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Fuji);
            }
            "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --fuji/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Local);
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                custom_url = Some(url);
            }
            "--contract" => {
                let address = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                contract = Some(address);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--ledger-path" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--ledger-path requires a path argument"))?;
                if ledger_path.is_some() {
                    return Err(eyre!("--ledger-path may only be specified once"));
                }
                ledger_path = Some(path);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag.unwrap_or(NetworkFlag::Fuji) {
        NetworkFlag::Fuji => client::NetworkTarget::Fuji {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_FUJI_RPC_URL.to_string()),
        },
        NetworkFlag::Local => client::NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };

    let contract = contract
        .ok_or_else(|| eyre!("Specify --contract <address> for the TicketSale contract"))?
        .parse()
        .map_err(|e| eyre!("Invalid contract address: {e}"))?;
    let dir = boxoffice::wallets::resolve_wallet_dir(wallet_dir.as_deref())
        .map_err(|e| eyre!(e))?;
    let wallets = client::WalletConfig::EthKeystore {
        name: wallet_name,
        dir,
    };

    Ok(client::AppConfig {
        network,
        wallets,
        contract_address: contract,
        ledger_path: ledger_path.map(Into::into),
    })
}

fn init_tracing() {
    // The UI owns the terminal, so logs go to a file instead of stderr.
    let log_dir = shellexpand::tilde("~/.boxoffice/logs").into_owned();
    let appender = rolling::never(log_dir, "boxoffice.log");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(appender)
        .with_ansi(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    tracing::info!("starting boxoffice client");
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
