use crate::dataset::Dataset;
use crate::error::InvalidQuarterError;
use crate::holdings::{Holdings, HoldingsFilter, Selection};
use crate::logo::{Logo, LogoFetcher};
use crate::lookup::Locale;
use crate::quarter::Quarter;
use chrono::NaiveDate;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Tabs, Wrap},
    Frame, Terminal,
};
use std::collections::{BTreeSet, HashMap};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tui_big_text::{BigText, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Composition,
    StockDeepDive,
    SectorShift,
    Logos,
}

impl Tab {
    fn index(self) -> usize {
        Tab::all().iter().position(|&t| t == self).unwrap_or(0)
    }

    fn all() -> &'static [Tab] {
        &[Tab::Composition, Tab::StockDeepDive, Tab::SectorShift, Tab::Logos]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "composition" => Some(Tab::Composition),
            "stock" => Some(Tab::StockDeepDive),
            "sectors" => Some(Tab::SectorShift),
            "logos" => Some(Tab::Logos),
            _ => None,
        }
    }
}

/// Static UI strings for one locale.
struct Labels {
    tabs: [&'static str; 4],
    title: &'static str,
    latest_snapshot: &'static str,
    top_holding: &'static str,
    top_sector: &'static str,
    rows_in_view: &'static str,
    range: &'static str,
    empty: &'static str,
    loading: &'static str,
    comparison: &'static str,
    comparison_hint: &'static str,
    help: &'static str,
}

const LABELS_EN: Labels = Labels {
    tabs: ["Portfolio Composition", "Stock Deep Dive", "Sector Shift", "Logos"],
    title: "Berkshire Portfolio 2000-2025",
    latest_snapshot: "Latest Snapshot",
    top_holding: "Top Holding",
    top_sector: "Top Sector",
    rows_in_view: "Rows in View",
    range: "Range",
    empty: "No holdings match the current filters",
    loading: "Loading holdings...",
    comparison: "Comparison ($B)",
    comparison_hint: "Press space to add the highlighted stock to the comparison",
    help: "h/l tabs | j/k select | space toggle | [ ] from | { } to | g language | f logos | r reset | q quit",
};

const LABELS_ZH: Labels = Labels {
    tabs: ["持仓构成", "个股分析", "行业变迁", "公司标志"],
    title: "伯克希尔持仓 2000-2025",
    latest_snapshot: "最新快照",
    top_holding: "第一大持仓",
    top_sector: "第一大行业",
    rows_in_view: "当前行数",
    range: "时间范围",
    empty: "没有符合当前筛选条件的持仓",
    loading: "正在加载持仓数据...",
    comparison: "对比 (十亿美元)",
    comparison_hint: "按空格键将当前股票加入对比",
    help: "h/l 切换标签 | j/k 选择 | 空格 勾选 | [ ] 起点 | { } 终点 | g 语言 | f 标志 | r 重置 | q 退出",
};

fn labels(locale: Locale) -> &'static Labels {
    match locale {
        Locale::En => &LABELS_EN,
        Locale::Zh => &LABELS_ZH,
    }
}

/// Short bar label such as `25Q3`.
fn short_quarter(date: NaiveDate) -> String {
    let q = Quarter::containing(date);
    format!("{:02}Q{}", q.year().rem_euclid(100), q.number())
}

pub struct App {
    pub current_tab: Tab,
    pub locale: Locale,
    pub dataset: Dataset,
    pub holdings: Holdings,
    /// `None` until the first filter pass has run.
    pub selection: Option<Selection>,
    pub dates: Vec<NaiveDate>,
    pub range_start: usize,
    pub range_end: usize,
    pub sector_filter: BTreeSet<String>,
    /// Tickers picked in the stock list, compared side by side.
    pub ticker_filter: BTreeSet<String>,
    pub sector_cursor: usize,
    pub ticker_cursor: usize,
    pub logos: HashMap<String, Logo>,
    pub logos_loading: bool,
    pub logo_fetcher: Option<LogoFetcher>,
    pub logo_receiver: Option<mpsc::UnboundedReceiver<Vec<(String, Logo)>>>,
    pub error_message: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(dataset: Dataset, locale: Locale) -> Result<App, InvalidQuarterError> {
        let holdings = dataset.normalize(locale)?;
        let dates = holdings.dates();
        let range_end = dates.len().saturating_sub(1);

        Ok(App {
            current_tab: Tab::Composition,
            locale,
            dataset,
            holdings,
            selection: None,
            dates,
            range_start: 0,
            range_end,
            sector_filter: BTreeSet::new(),
            ticker_filter: BTreeSet::new(),
            sector_cursor: 0,
            ticker_cursor: 0,
            logos: HashMap::new(),
            logos_loading: false,
            logo_fetcher: None,
            logo_receiver: None,
            error_message: None,
            should_quit: false,
        })
    }

    pub fn filter(&self) -> HoldingsFilter {
        let filter = HoldingsFilter::new()
            .with_sectors(self.sector_filter.iter().cloned())
            .with_tickers(self.ticker_filter.iter().cloned());
        match (self.dates.get(self.range_start), self.dates.get(self.range_end)) {
            (Some(&from), Some(&to)) => filter.with_date_range(from, to),
            _ => filter,
        }
    }

    /// Recomputes the selection from the canonical table.
    pub fn refresh(&mut self) {
        self.selection = Some(self.holdings.select(&self.filter()));
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        self.current_tab = tabs[(self.current_tab.index() + 1) % tabs.len()];
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        self.current_tab = tabs[(self.current_tab.index() + tabs.len() - 1) % tabs.len()];
    }

    /// Switches language and carries the sector filter over by ticker, since
    /// sector names differ between locales.
    pub fn switch_locale(&mut self) {
        let next = self.locale.next();
        let holdings = match self.dataset.normalize(next) {
            Ok(h) => h,
            Err(e) => {
                self.error_message = Some(e.to_string());
                return;
            }
        };

        let tickers: BTreeSet<&str> = self
            .holdings
            .rows()
            .iter()
            .filter(|r| self.sector_filter.contains(r.get_sector()))
            .map(|r| r.get_ticker())
            .collect();
        let sector_filter: BTreeSet<String> = holdings
            .rows()
            .iter()
            .filter(|r| tickers.contains(r.get_ticker()))
            .map(|r| r.get_sector().to_string())
            .collect();

        info!(locale = %next, "switched language");
        self.sector_filter = sector_filter;
        self.holdings = holdings;
        self.locale = next;
        self.refresh();
    }

    pub fn move_range_start(&mut self, forward: bool) {
        if forward {
            if self.range_start < self.range_end {
                self.range_start += 1;
            }
        } else {
            self.range_start = self.range_start.saturating_sub(1);
        }
        self.refresh();
    }

    pub fn move_range_end(&mut self, forward: bool) {
        if forward {
            if self.range_end + 1 < self.dates.len() {
                self.range_end += 1;
            }
        } else if self.range_end > self.range_start {
            self.range_end -= 1;
        }
        self.refresh();
    }

    pub fn toggle_sector(&mut self) {
        if let Some(sector) = self.holdings.sectors().get(self.sector_cursor) {
            if !self.sector_filter.remove(sector) {
                self.sector_filter.insert(sector.clone());
            }
            self.refresh();
        }
    }

    pub fn toggle_ticker(&mut self) {
        if let Some(ticker) = self.holdings.tickers().get(self.ticker_cursor) {
            if !self.ticker_filter.remove(ticker) {
                self.ticker_filter.insert(ticker.clone());
            }
            self.refresh();
        }
    }

    pub fn reset_filters(&mut self) {
        self.sector_filter.clear();
        self.ticker_filter.clear();
        self.range_start = 0;
        self.range_end = self.dates.len().saturating_sub(1);
        self.refresh();
    }

    pub fn select_next(&mut self) {
        match self.current_tab {
            Tab::StockDeepDive => {
                if self.ticker_cursor + 1 < self.holdings.tickers().len() {
                    self.ticker_cursor += 1;
                }
            }
            Tab::SectorShift => {
                if self.sector_cursor + 1 < self.holdings.sectors().len() {
                    self.sector_cursor += 1;
                }
            }
            _ => {}
        }
    }

    pub fn select_previous(&mut self) {
        match self.current_tab {
            Tab::StockDeepDive => self.ticker_cursor = self.ticker_cursor.saturating_sub(1),
            Tab::SectorShift => self.sector_cursor = self.sector_cursor.saturating_sub(1),
            _ => {}
        }
    }

    fn logo_targets(&self) -> Vec<(String, Option<String>)> {
        self.holdings
            .tickers()
            .into_iter()
            .map(|ticker| {
                let domain = self.dataset.catalog.logo_domain(&ticker).map(str::to_string);
                (ticker, domain)
            })
            .collect()
    }

    /// Fetches logos in a background task. Results arrive over a channel.
    pub fn start_logo_fetch(&mut self) {
        if self.logos_loading {
            return;
        }
        let Some(fetcher) = self.logo_fetcher.clone() else {
            warn!("no logo fetcher configured, keeping placeholders");
            return;
        };

        let targets = self.logo_targets();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.logo_receiver = Some(receiver);
        self.logos_loading = true;

        tokio::spawn(async move {
            let logos = fetcher.fetch_all(&targets).await;
            // receiver is gone once the app has quit
            let _ = sender.send(logos);
        });
    }

    pub fn try_receive_logos(&mut self) -> bool {
        if let Some(receiver) = &mut self.logo_receiver {
            if let Ok(logos) = receiver.try_recv() {
                self.logos.extend(logos);
                self.logos_loading = false;
                self.logo_receiver = None;
                return true;
            }
        }
        false
    }
}

pub async fn run_tui(
    dataset: Dataset,
    locale: Locale,
    tab: Option<Tab>,
    logo_fetcher: Option<LogoFetcher>,
) -> io::Result<()> {
    let mut app = App::new(dataset, locale).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if let Some(tab) = tab {
        app.current_tab = tab;
    }
    app.logo_fetcher = logo_fetcher;
    app.refresh();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        app.try_receive_logos();

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.error_message.take().is_some() {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                        KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => app.previous_tab(),
                        KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => app.next_tab(),
                        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                        KeyCode::Char(' ') | KeyCode::Enter => match app.current_tab {
                            Tab::SectorShift => app.toggle_sector(),
                            Tab::StockDeepDive => app.toggle_ticker(),
                            _ => {}
                        },
                        KeyCode::Char('[') => app.move_range_start(false),
                        KeyCode::Char(']') => app.move_range_start(true),
                        KeyCode::Char('{') => app.move_range_end(false),
                        KeyCode::Char('}') => app.move_range_end(true),
                        KeyCode::Char('g') => app.switch_locale(),
                        KeyCode::Char('r') => app.reset_filters(),
                        KeyCode::Char('f') => app.start_logo_fetch(),
                        KeyCode::Char('1') => app.current_tab = Tab::Composition,
                        KeyCode::Char('2') => app.current_tab = Tab::StockDeepDive,
                        KeyCode::Char('3') => app.current_tab = Tab::SectorShift,
                        KeyCode::Char('4') => app.current_tab = Tab::Logos,
                        _ => {}
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let text = labels(app.locale);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(text.tabs[t.index()], style))
        })
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} [{}]", text.title, app.locale)),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(app.current_tab.index());
    f.render_widget(tabs, chunks[0]);

    render_metrics(f, chunks[1], app);

    match app.current_tab {
        Tab::Composition => render_composition(f, chunks[2], app),
        Tab::StockDeepDive => render_stock(f, chunks[2], app),
        Tab::SectorShift => render_sectors(f, chunks[2], app),
        Tab::Logos => render_logos(f, chunks[2], app),
    }

    let range = match app.filter().date_range() {
        Some((from, to)) => format!(
            "{}: {} - {}",
            text.range,
            Quarter::containing(from),
            Quarter::containing(to)
        ),
        _ => String::new(),
    };
    let help = Paragraph::new(text.help)
        .block(Block::default().borders(Borders::ALL).title(range))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[3]);

    if let Some(error) = &app.error_message {
        render_error_popup(f, error);
    }
}

fn render_metrics(f: &mut Frame, area: Rect, app: &App) {
    let text = labels(app.locale);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(area);

    let holdings = app.selection.as_ref().and_then(Selection::holdings);
    let latest = holdings.and_then(Holdings::latest_date);
    let top = holdings.and_then(Holdings::top_holding);
    let top_sector = match (holdings, latest) {
        (Some(h), Some(date)) => h.top_sector_at(date),
        _ => None,
    };

    let metric = |title: &str, value: String, detail: String| {
        Paragraph::new(vec![
            Line::from(Span::styled(
                value,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(detail, Style::default().fg(Color::Gray))),
        ])
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .alignment(Alignment::Center)
    };

    let latest_label = latest
        .map(|d| Quarter::containing(d).to_string())
        .unwrap_or_else(|| "-".to_string());
    f.render_widget(metric(text.latest_snapshot, latest_label, String::new()), cols[0]);

    // big ticker for the top holding, weight in the title
    let (ticker, weight) = match top {
        Some(row) => (row.get_ticker().to_string(), format!(" {:.1}%", row.get_percent_of_portfolio())),
        None => ("-".to_string(), String::new()),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("{}{weight}", text.top_holding))
        .title_alignment(Alignment::Center);
    let inner = block.inner(cols[1]);
    f.render_widget(block, cols[1]);

    // Quadrant pixels are four columns wide per character
    let big_text_width = ticker.chars().count() as u16 * 4;
    let centered_area = if big_text_width < inner.width {
        let margin = (inner.width - big_text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };
    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![ticker.into()])
        .build();
    f.render_widget(big_text, centered_area);

    let (sector, sector_value) = match top_sector {
        Some(t) => (t.sector, format!("${:.1}B", t.value / 1000.0)),
        None => ("-".to_string(), String::new()),
    };
    f.render_widget(metric(text.top_sector, sector, sector_value), cols[2]);

    let count = holdings.map(Holdings::len).unwrap_or(0);
    f.render_widget(
        metric(text.rows_in_view, count.to_string(), format!("/ {}", app.holdings.len())),
        cols[3],
    );
}

fn render_composition(f: &mut Frame, area: Rect, app: &App) {
    let holdings = match &app.selection {
        Some(Selection::Rows(holdings)) => holdings,
        Some(Selection::Empty) => return render_empty(f, area, app),
        None => return render_loading(f, area, app),
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let bars: Vec<(String, u64)> = holdings
        .dates()
        .into_iter()
        .map(|date| (short_quarter(date), (holdings.total_value_at(date) / 1000.0).round() as u64))
        .collect();
    let data: Vec<(&str, u64)> = bars.iter().map(|(l, v)| (l.as_str(), *v)).collect();

    let barchart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Value ($B)"),
        )
        .data(&data)
        .bar_width(5)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    f.render_widget(barchart, chunks[0]);

    let header = Row::new(["Company", "$B", "%"].map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .bottom_margin(1);

    let rows = holdings.latest_snapshot().iter().map(|row| {
        Row::new(vec![
            Cell::from(row.get_display_label().to_string()),
            Cell::from(format!("{:.1}", row.value_billions())),
            Cell::from(format!("{:.1}", row.get_percent_of_portfolio())),
        ])
    });

    let title = holdings
        .latest_date()
        .map(|d| Quarter::containing(d).to_string())
        .unwrap_or_default();
    let table = Table::new(
        rows,
        [Constraint::Percentage(64), Constraint::Percentage(18), Constraint::Percentage(18)],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .style(Style::default().fg(Color::White));
    f.render_widget(table, chunks[1]);
}

fn render_stock(f: &mut Frame, area: Rect, app: &App) {
    let tickers = app.holdings.tickers();
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let items: Vec<ListItem> = tickers
        .iter()
        .enumerate()
        .map(|(i, ticker)| {
            let style = if i == app.ticker_cursor {
                Style::default().bg(Color::DarkGray).fg(Color::Yellow)
            } else {
                Style::default()
            };
            let mark = if app.ticker_filter.contains(ticker) { "[x]" } else { "[ ]" };
            let label = app.dataset.catalog.tables(app.locale).display_label(ticker);
            ListItem::new(Line::from(Span::styled(format!("{mark} {label}"), style)))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(labels(app.locale).tabs[1]))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, chunks[0]);

    let Some(ticker) = tickers.get(app.ticker_cursor) else {
        return render_empty(f, chunks[1], app);
    };
    let history = app.holdings.history(ticker);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(35),
            Constraint::Percentage(30),
        ])
        .split(chunks[1]);

    let bars: Vec<(String, u64)> = history
        .rows()
        .iter()
        .map(|r| (short_quarter(r.get_as_of_date()), r.value_billions().round() as u64))
        .collect();
    let data: Vec<(&str, u64)> = bars.iter().map(|(l, v)| (l.as_str(), *v)).collect();
    let barchart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{ticker}: Market Value History ($B)")),
        )
        .data(&data)
        .bar_width(5)
        .bar_style(Style::default().fg(Color::Blue))
        .value_style(Style::default().fg(Color::White).bg(Color::Blue));
    f.render_widget(barchart, right[0]);

    let rows = history.rows().iter().map(|r| {
        Row::new(vec![
            Cell::from(r.get_quarter_label().to_string()),
            Cell::from(format!("{:.0}", r.get_shares())),
            Cell::from(format!("{:.2}", r.value_billions())),
            Cell::from(format!("{:.1}%", r.get_percent_of_portfolio())),
        ])
    });
    let header = Row::new(["Quarter", "Shares", "$B", "%"].map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }));
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(22),
            Constraint::Percentage(38),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(format!("{ticker}: Shares Held History")));
    f.render_widget(table, right[1]);

    render_comparison(f, right[2], app);
}

// One column per picked ticker, one row per quarter in the current selection
fn render_comparison(f: &mut Frame, area: Rect, app: &App) {
    let text = labels(app.locale);
    if app.ticker_filter.is_empty() {
        let hint = Paragraph::new(text.comparison_hint)
            .block(Block::default().borders(Borders::ALL).title(text.comparison))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(hint, area);
        return;
    }

    let holdings = match &app.selection {
        Some(Selection::Rows(holdings)) => holdings,
        Some(Selection::Empty) => return render_empty(f, area, app),
        None => return render_loading(f, area, app),
    };

    let tickers: Vec<&String> = app.ticker_filter.iter().collect();
    let header = Row::new(
        std::iter::once("Quarter".to_string())
            .chain(tickers.iter().map(|t| t.to_string()))
            .map(|h| {
                Cell::from(h).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    );

    let rows = holdings.dates().into_iter().rev().map(|date| {
        let snapshot = holdings.snapshot(date);
        let values = tickers.iter().map(|ticker| {
            snapshot
                .iter()
                .find(|r| r.get_ticker() == ticker.as_str())
                .map(|r| format!("{:.2}", r.value_billions()))
                .unwrap_or_else(|| "-".to_string())
        });
        Row::new(
            std::iter::once(Quarter::containing(date).to_string())
                .chain(values)
                .map(Cell::from),
        )
    });

    let mut widths = vec![Constraint::Length(9)];
    widths.extend(tickers.iter().map(|_| Constraint::Min(8)));
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(text.comparison))
        .style(Style::default().fg(Color::White));
    f.render_widget(table, area);
}

fn render_sectors(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let items: Vec<ListItem> = app
        .holdings
        .sectors()
        .into_iter()
        .enumerate()
        .map(|(i, sector)| {
            let mark = if app.sector_filter.contains(&sector) { "[x]" } else { "[ ]" };
            let style = if i == app.sector_cursor {
                Style::default().bg(Color::DarkGray).fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(format!("{mark} {sector}"), style)))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(labels(app.locale).tabs[2]))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, chunks[0]);

    let holdings = match &app.selection {
        Some(Selection::Rows(holdings)) => holdings,
        Some(Selection::Empty) => return render_empty(f, chunks[1], app),
        None => return render_loading(f, chunks[1], app),
    };

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    let rows = holdings.sector_totals().into_iter().rev().map(|t| {
        Row::new(vec![
            Cell::from(Quarter::containing(t.date).to_string()),
            Cell::from(t.sector),
            Cell::from(format!("{:.2}", t.value / 1000.0)),
        ])
    });
    let header = Row::new(["Quarter", "Sector", "$B"].map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }));
    let table = Table::new(
        rows,
        [Constraint::Percentage(25), Constraint::Percentage(50), Constraint::Percentage(25)],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Portfolio Value Composition by Sector"));
    f.render_widget(table, right[0]);

    if let Some(latest) = holdings.latest_date() {
        let allocation: Vec<ListItem> = holdings
            .sector_share_at(latest)
            .into_iter()
            .map(|(sector, share)| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{sector:<24}"), Style::default().fg(Color::Cyan)),
                    Span::styled(format!("{share:>8.2}%"), Style::default().fg(Color::Cyan)),
                ]))
            })
            .collect();
        let list = List::new(allocation).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Sector Allocation ({})", Quarter::containing(latest))),
        );
        f.render_widget(list, right[1]);
    }
}

fn render_logos(f: &mut Frame, area: Rect, app: &App) {
    let tables = app.dataset.catalog.tables(app.locale);
    let rows = app.holdings.tickers().into_iter().map(|ticker| {
        let domain = app.dataset.catalog.logo_domain(&ticker).unwrap_or("-").to_string();
        let status = match app.logos.get(&ticker) {
            Some(Logo::Embedded { domain, data_uri }) => {
                Cell::from(format!("{domain} ({} chars)", data_uri.len())).style(Style::default().fg(Color::Green))
            }
            Some(Logo::Placeholder) => Cell::from("placeholder").style(Style::default().fg(Color::Gray)),
            None if app.logos_loading => Cell::from("...").style(Style::default().fg(Color::Yellow)),
            None => Cell::from("-"),
        };
        Row::new(vec![
            Cell::from(ticker.clone()),
            Cell::from(tables.company_name(&ticker).to_string()),
            Cell::from(domain),
            status,
        ])
    });

    let header = Row::new(["Ticker", "Company", "Domain", "Logo"].map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .bottom_margin(1);

    let title = if app.logos_loading {
        format!("{} - fetching...", labels(app.locale).tabs[3])
    } else {
        format!("{} - f (fetch)", labels(app.locale).tabs[3])
    };
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(10),
            Constraint::Percentage(40),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .style(Style::default().fg(Color::White));
    f.render_widget(table, area);
}

fn render_empty(f: &mut Frame, area: Rect, app: &App) {
    let notice = Paragraph::new(labels(app.locale).empty)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    f.render_widget(notice, area);
}

fn render_loading(f: &mut Frame, area: Rect, app: &App) {
    let loading_text = Paragraph::new(labels(app.locale).loading)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    f.render_widget(loading_text, area);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(error)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        let dataset = Dataset::embedded().unwrap().clone();
        App::new(dataset, Locale::En).unwrap()
    }

    #[test]
    fn test_selection_starts_uncomputed() {
        let mut app = app();
        assert!(app.selection.is_none());

        app.refresh();
        let selection = app.selection.as_ref().unwrap();
        assert_eq!(selection.holdings().unwrap().len(), app.holdings.len());
    }

    #[test]
    fn test_tab_navigation() {
        let mut app = app();
        assert_eq!(app.current_tab, Tab::Composition);
        app.previous_tab();
        assert_eq!(app.current_tab, Tab::Logos);
        app.next_tab();
        app.next_tab();
        assert_eq!(app.current_tab, Tab::StockDeepDive);
        assert_eq!(Tab::from_str("Sectors"), Some(Tab::SectorShift));
        assert_eq!(Tab::from_str("balances"), None);
    }

    #[test]
    fn test_date_range_slider() {
        let mut app = app();
        app.refresh();
        let last = app.dates.len() - 1;
        assert_eq!((app.range_start, app.range_end), (0, last));

        app.move_range_end(true);
        assert_eq!(app.range_end, last);

        for _ in 0..app.dates.len() * 2 {
            app.move_range_start(true);
        }
        assert_eq!(app.range_start, app.range_end);

        let selection = app.selection.as_ref().unwrap().holdings().unwrap();
        assert_eq!(selection.dates(), vec![app.dates[last]]);

        app.reset_filters();
        assert_eq!((app.range_start, app.range_end), (0, last));
    }

    #[test]
    fn test_empty_selection_from_sector_and_range() {
        let mut app = app();
        app.sector_filter.insert("Energy".to_string());
        // 2000 Q4 through 2010 Q4 hold no energy stocks
        app.range_end = 2;
        app.refresh();

        assert_eq!(app.selection, Some(Selection::Empty));
    }

    #[test]
    fn test_switch_locale_keeps_sector_filter() {
        let mut app = app();
        app.sector_filter.insert("Energy".to_string());
        app.refresh();
        let before = app.selection.as_ref().unwrap().holdings().unwrap().len();

        app.switch_locale();
        assert_eq!(app.locale, Locale::Zh);
        assert!(app.sector_filter.contains("能源"));
        let rows = app.selection.as_ref().unwrap().holdings().unwrap();
        assert_eq!(rows.len(), before);
        assert!(rows.rows().iter().all(|r| r.get_display_label().ends_with(')')));

        app.switch_locale();
        assert_eq!(app.locale, Locale::En);
        assert!(app.sector_filter.contains("Energy"));
    }

    #[test]
    fn test_toggle_sector() {
        let mut app = app();
        app.current_tab = Tab::SectorShift;
        let first = app.holdings.sectors()[0].clone();

        app.toggle_sector();
        assert!(app.sector_filter.contains(&first));
        app.toggle_sector();
        assert!(app.sector_filter.is_empty());
    }

    #[test]
    fn test_toggle_tickers_selects_their_rows() {
        let mut app = app();
        app.current_tab = Tab::StockDeepDive;
        let tickers = app.holdings.tickers();

        app.ticker_cursor = tickers.iter().position(|t| t == "KO").unwrap();
        app.toggle_ticker();
        app.ticker_cursor = tickers.iter().position(|t| t == "BAC").unwrap();
        app.toggle_ticker();

        let selection = app.selection.as_ref().unwrap().holdings().unwrap();
        assert_eq!(selection.tickers(), vec!["BAC".to_string(), "KO".to_string()]);
        assert_eq!(
            selection.len(),
            app.holdings.history("KO").len() + app.holdings.history("BAC").len()
        );

        app.toggle_ticker();
        assert_eq!(app.ticker_filter.len(), 1);
        app.reset_filters();
        assert!(app.ticker_filter.is_empty());
        assert_eq!(app.selection.as_ref().unwrap().holdings().unwrap().len(), app.holdings.len());
    }

    #[test]
    fn test_short_quarter() {
        let date = NaiveDate::from_ymd_opt(2005, 12, 31).unwrap();
        assert_eq!(short_quarter(date), "05Q4");
    }

    #[tokio::test]
    async fn test_logo_fetch_without_fetcher_keeps_placeholders() {
        let mut app = app();
        app.start_logo_fetch();
        assert!(!app.logos_loading);
        assert!(!app.try_receive_logos());
    }
}
