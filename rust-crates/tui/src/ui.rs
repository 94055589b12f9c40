use crate::client::AppSnapshot;
use alloy::primitives::U256;
use boxoffice::PurchasePhase;
use color_eyre::eyre::{Result, eyre};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{prelude::*, widgets::*};
use std::{
    io::stdout,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub enum UserEvent {
    Quit,
    Connect,
    Disconnect,
    Buy,
    Refresh,
    Resync,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct InputEventReceiver {
    events: mpsc::UnboundedReceiver<Event>,
    paused: Arc<AtomicBool>,
}

impl InputEventReceiver {
    /// Stop consuming terminal input so another reader (the keystore
    /// password prompt) can own the tty.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume consuming input, discarding anything buffered while paused
    /// so stale keystrokes never fire actions.
    pub fn resume(&mut self) {
        self.paused.store(false, Ordering::Relaxed);
        while self.events.try_recv().is_ok() {}
    }
}

/// Terminal input runs on its own thread feeding a channel; the run loop's
/// select never blocks on the tty, so its ticker and signal branches stay
/// live while the user is idle.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    let paused = Arc::new(AtomicBool::new(false));
    let reader_paused = Arc::clone(&paused);
    std::thread::spawn(move || {
        loop {
            if reader_paused.load(Ordering::Relaxed) {
                std::thread::sleep(INPUT_POLL_INTERVAL);
                continue;
            }
            match event::poll(INPUT_POLL_INTERVAL) {
                Ok(false) => continue,
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Err(_) => break,
            }
        }
    });
    InputEventReceiver { events: rx, paused }
}

pub async fn next_raw_event(input: &mut InputEventReceiver) -> Result<Event> {
    input
        .events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input stream closed"))
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        Event::Key(k) if k.kind == KeyEventKind::Press => match &state.mode {
            Mode::QuitModal => match k.code {
                KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            },
            Mode::Normal => match k.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    state.mode = Mode::QuitModal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char('c') => Some(UserEvent::Connect),
                KeyCode::Char('d') => Some(UserEvent::Disconnect),
                KeyCode::Char('b') => Some(UserEvent::Buy),
                KeyCode::Char('r') => Some(UserEvent::Refresh),
                KeyCode::Char('R') => Some(UserEvent::Resync),
                _ => None,
            },
        },
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // wallet + contract
            Constraint::Length(3), // sale progress gauge
            Constraint::Min(10),   // sale info + owned tickets
            Constraint::Length(7), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    draw_sale_gauge(f, chunks[1], snap);
    draw_middle(f, chunks[2], snap);
    draw_status(f, chunks[3], snap);
    draw_help(f, chunks[4]);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let account_text = match snap.account {
        Some(address) => address.to_string(),
        None => String::from("Not connected (press 'c')"),
    };
    let lines = vec![
        Line::from(format!("Account:  {}", account_text)),
        Line::from(format!(
            "Contract: {} ({})",
            snap.contract_address, snap.network_label
        )),
    ];
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_sale_gauge(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let ratio = if snap.capacity == 0 {
        0.0
    } else {
        (snap.total_sold as f64 / snap.capacity as f64).clamp(0.0, 1.0)
    };
    let color = if snap.total_sold >= snap.capacity {
        Color::Red
    } else {
        Color::Green
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Tickets Sold"))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(format!("{} / {}", snap.total_sold, snap.capacity));
    f.render_widget(gauge, area);
}

fn draw_middle(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);
    draw_sale_panel(f, cols[0], snap);
    draw_ticket_panel(f, cols[1], snap);
}

fn draw_sale_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let remaining = snap.capacity.saturating_sub(snap.total_sold);
    let lines = vec![
        Line::from(format!(
            "Price:     {} AVAX",
            format_avax(snap.price_per_ticket)
        )),
        Line::from(format!("Remaining: {}", remaining)),
        Line::from(""),
        Line::from(format!("Purchase:  {}", phase_text(&snap.phase))),
    ];
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Sale"));
    f.render_widget(widget, area);
}

fn draw_ticket_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = Vec::new();
    if snap.tickets.is_empty() {
        lines.push(Line::styled("None", Style::default().fg(Color::DarkGray)));
    } else {
        for row in &snap.tickets {
            let tx = match &row.tx_hash {
                Some(hash) => short_hash(hash),
                None => String::from("(resynced)"),
            };
            lines.push(Line::from(format!(
                "#{:<4} {}  {}",
                row.ticket_id, row.purchased_at, tx
            )));
        }
    }
    // sale-wide after a resync, not just the connected account's tickets
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Recent Purchases"),
    );
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for e in &snap.errors {
            lines.push(Line::from(e.clone()));
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "c connect | d disconnect | b buy ticket | r refresh | R resync from chain | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if let Mode::QuitModal = &state.mode {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Quit");
        let p = Paragraph::new("Quit the box office? y/Enter=yes n/Esc=no");
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn phase_text(phase: &PurchasePhase) -> String {
    match phase {
        PurchasePhase::Idle => String::from("Idle"),
        PurchasePhase::Submitting => String::from("Submitting..."),
        PurchasePhase::PendingConfirmation { tx_hash } => {
            format!("Waiting for {}", short_hash(&tx_hash.to_string()))
        }
        PurchasePhase::Recorded { ticket } => {
            format!("Ticket #{} recorded", ticket.ticket_id)
        }
        PurchasePhase::Declined { reason } => format!("Declined: {}", reason),
    }
}

fn short_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        hash.to_string()
    } else {
        format!("{}..{}", &hash[..8], &hash[hash.len() - 4..])
    }
}

const WEI_PER_AVAX: u128 = 1_000_000_000_000_000_000;
const DISPLAY_DECIMALS: u32 = 4;

fn format_avax(wei: U256) -> String {
    let whole = wei / U256::from(WEI_PER_AVAX);
    let fractional = (wei % U256::from(WEI_PER_AVAX)).to::<u128>();
    let scaled = fractional / (WEI_PER_AVAX / 10u128.pow(DISPLAY_DECIMALS));
    if scaled == 0 {
        format!("{}", whole)
    } else {
        format!(
            "{}.{}",
            whole,
            format!("{:04}", scaled).trim_end_matches('0')
        )
    }
}
