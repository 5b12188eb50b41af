use std::io::{self, Stdout};

use anyhow::Result;
use ratatui::{
    crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use taxi_world_core::{
    Action, GRID_SIZE, GridCell,
    agent::{GreedyPolicy, Policy, RandomPolicy},
    encoding::EncodedState,
    environment::{EnvironmentView, StepResult, TaxiEnv},
    q_table::ValueTable,
};

/// Most recent step, kept for the status panel.
struct LastStep {
    action: Action,
    result: StepResult,
}

struct App {
    env: TaxiEnv,
    table: Option<ValueTable>,
    random: RandomPolicy,
    state: EncodedState,
    episode: usize,
    total_reward: f64,
    last: Option<LastStep>,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Set once the current episode has ended.
    episode_over: bool,
}

impl App {
    fn new(mut env: TaxiEnv, table: Option<ValueTable>, seed: u64) -> Self {
        let state = env.reset();
        App {
            env,
            table,
            random: RandomPolicy::new(seed),
            state,
            episode: 1,
            total_reward: 0.0,
            last: None,
            should_quit: false,
            episode_over: false,
        }
    }

    /// Advances the episode by one action.
    fn tick(&mut self) {
        if self.episode_over {
            return;
        }
        let action = match &self.table {
            Some(table) => GreedyPolicy::new(table).select_action(self.state),
            None => self.random.select_action(self.state),
        };
        let result = self.env.step(action);
        self.state = result.state;
        self.total_reward += result.reward;
        self.episode_over = result.done;
        self.last = Some(LastStep { action, result });
    }

    fn reset(&mut self) {
        self.state = self.env.reset();
        self.episode += 1;
        self.total_reward = 0.0;
        self.last = None;
        self.episode_over = false;
    }

    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Runs the viewer until the user quits.
pub fn run(env: TaxiEnv, table: Option<ValueTable>, seed: u64) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(env, table, seed);
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Blocks on key events; each step is driven by the user.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                KeyCode::Char(' ') | KeyCode::Enter => app.tick(),
                KeyCode::Char('r') => app.reset(),
                _ => {}
            }
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(GRID_SIZE as u16 + 2), // grid
            Constraint::Min(7),                       // status
            Constraint::Length(2),                    // help
        ])
        .split(frame.area());

    render_grid(frame, main_layout[0], app.env.view());
    render_status(frame, main_layout[1], app);

    let help_text = Paragraph::new("space/enter: step   r: new episode   q/esc: quit")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn glyph_style(glyph: char) -> Style {
    match glyph {
        '#' => Style::default().fg(Color::Red),
        'P' => Style::default().fg(Color::Cyan).bold(),
        'D' => Style::default().fg(Color::Green).bold(),
        't' => Style::default().fg(Color::Yellow).bold(),
        'T' => Style::default().fg(Color::LightYellow).bold().reversed(),
        _ => Style::default().fg(Color::DarkGray),
    }
}

/// Renders the taxi grid onto the frame.
fn render_grid(frame: &mut Frame, area: Rect, view: EnvironmentView<'_>) {
    let lines: Vec<Line> = (0..GRID_SIZE)
        .map(|row| {
            let spans: Vec<Span> = (0..GRID_SIZE)
                .map(|col| {
                    let glyph = view.glyph(GridCell::new(row, col));
                    Span::styled(format!("{glyph} "), glyph_style(glyph))
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let grid = Paragraph::new(lines)
        .block(Block::default().title("Taxi World").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(grid, area);
}

/// Renders episode progress and the most recent step.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.env.view();
    let policy = if app.table.is_some() { "greedy" } else { "random" };

    let mut items = vec![
        ListItem::new(format!("Episode {} ({policy} policy)", app.episode)),
        ListItem::new(format!(
            "Taxi {}  passenger {}  destination {}  aboard: {}",
            view.agent_position(),
            view.passenger_position(),
            view.destination_position(),
            view.passenger_aboard()
        )),
        ListItem::new(format!(
            "Steps {}/{}  total reward {:.2}",
            view.steps_taken(),
            view.max_steps(),
            app.total_reward
        )),
    ];
    if let Some(last) = &app.last {
        items.push(ListItem::new(format!(
            "Last action: {}  reward {:.2}",
            last.action, last.result.reward
        )));
    }
    if app.episode_over {
        let (text, color) = match &app.last {
            Some(last) if last.result.info.step_limit_reached => ("Step limit reached", Color::Red),
            _ => ("Passenger delivered!", Color::Green),
        };
        items.push(ListItem::new(Span::styled(text, Style::default().fg(color).bold())));
    }

    let status = List::new(items).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}
