use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_ROSTER: [&str; 8] = [
    "rahul r", "rahul sh", "sapna", "meera", "nitin", "vineet", "ritik", "sanju",
];

const PERFORMANCE_SHEET: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQclZvKpPugj7vtMuKG_I6UZ5QPzRRR-dKhRutTZ4xSz-PcKuP4DnoVNv85uoOTTnxxPh5s1tjvjD0q/pub?gid=1719907297&single=true&output=csv";
const REPORT_SHEET: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQhkgBlDhx8JpRxdy_YpYlLfv76KhKDcF4Xkh4BDu6IjMIkAI3CZaoWqxthmqZi13Zaky3xgAW-kI5l/pub?output=csv";
const SUMMARY_SHEET: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQwaGNsk4xLU0dDrg3Q8EbTV7Bv96ZYiHpzl-dwrUSM7HlttloPCgDl2M9uolb1ZR0wfeHSLA6At8e3/pub?gid=1868562510&single=true&output=csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Team overview: performance list, totals, alerts.
    Dashboard,
    /// Searchable, sortable, paginated raw table.
    Collection,
    /// Raw table with new/changed row highlighting.
    Report,
    /// Header-keyed records.
    Summary,
    /// Filter and export; fetched once on load.
    Exporter,
}

impl ViewKind {
    pub const ALL: [ViewKind; 5] = [
        ViewKind::Dashboard,
        ViewKind::Collection,
        ViewKind::Report,
        ViewKind::Summary,
        ViewKind::Exporter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Dashboard => "dashboard",
            ViewKind::Collection => "collection",
            ViewKind::Report => "report",
            ViewKind::Summary => "summary",
            ViewKind::Exporter => "exporter",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        ViewKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name.trim()))
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            ViewKind::Dashboard => "DASHBOARD",
            ViewKind::Collection => "COLLECTION",
            ViewKind::Report => "REPORT",
            ViewKind::Summary => "SUMMARY",
            ViewKind::Exporter => "EXPORT",
        }
    }

    fn default_url(&self) -> &'static str {
        match self {
            ViewKind::Report => REPORT_SHEET,
            ViewKind::Summary => SUMMARY_SHEET,
            _ => PERFORMANCE_SHEET,
        }
    }

    /// Refresh period; `None` for views that only fetch on load.
    fn default_interval_ms(&self) -> Option<u64> {
        match self {
            ViewKind::Dashboard | ViewKind::Report | ViewKind::Summary => Some(5_000),
            // ~16.7 minutes. Probably meant to be 10 s; kept as configured.
            ViewKind::Collection => Some(1_000_000),
            ViewKind::Exporter => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewConfig {
    pub kind: ViewKind,
    pub url: String,
    pub interval: Option<Duration>,
    /// Append a `t=<epoch ms>` query parameter to every request.
    pub cache_bust: bool,
}

impl ViewConfig {
    pub fn from_env(kind: ViewKind) -> Self {
        let prefix = kind.env_prefix();
        let url = std::env::var(format!("{}_CSV_URL", prefix))
            .unwrap_or_else(|_| kind.default_url().to_string());
        let interval_ms = std::env::var(format!("{}_INTERVAL_MS", prefix))
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .or(kind.default_interval_ms())
            .filter(|ms| *ms > 0);
        let cache_bust = std::env::var(format!("{}_CACHE_BUST", prefix))
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(kind == ViewKind::Collection);
        Self {
            kind,
            url,
            interval: interval_ms.map(Duration::from_millis),
            cache_bust,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub views: Vec<ViewConfig>,
    pub roster: Vec<String>,
    pub sqlite_path: String,
    pub store_prefix: String,
    pub session_hours: u64,
    pub highlight_ms: u64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// 0 disables the request timeout.
    pub fetch_timeout_secs: u64,
    pub export_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        let selected = std::env::var("VIEWS").unwrap_or_else(|_| "all".to_string());
        let views = if selected.trim().eq_ignore_ascii_case("all") {
            ViewKind::ALL.to_vec()
        } else {
            selected.split(',').filter_map(ViewKind::parse).collect()
        };

        Self {
            views: views.into_iter().map(ViewConfig::from_env).collect(),
            roster: std::env::var("TEAM_ROSTER")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| DEFAULT_ROSTER.iter().map(|s| s.to_string()).collect()),
            sqlite_path: env_or("SQLITE_PATH", "./sheetpulse.sqlite"),
            store_prefix: env_or("STORE_PREFIX", "sheetpulse"),
            session_hours: env_parse("SESSION_HOURS", 8),
            highlight_ms: env_parse("HIGHLIGHT_MS", 3000),
            username: env_or("DASH_USER", "demo"),
            password: env_or("DASH_PASSWORD", "demo@123"),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", 0),
            export_dir: env_or("EXPORT_DIR", "."),
        }
    }

    pub fn view(&self, kind: ViewKind) -> Option<&ViewConfig> {
        self.views.iter().find(|v| v.kind == kind)
    }

    pub fn highlight_window(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset or unparsable values fall back to `default`.
fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
