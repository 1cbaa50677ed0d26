//! Logging facilities for Horizon Display.
//!
//! Horizon Display uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_display=debug")
//!     .init();
//! ```
//!
//! Strategy rebuilds log at `debug`, cursor movement and re-indexing at
//! `trace`.

/// Span names used throughout Horizon Display for tracing.
pub mod span_names {
    /// Strategy cache rebuild span.
    pub const REBUILD: &str = "horizon_display::rebuild";
    /// Projection update span.
    pub const PROJECTION: &str = "horizon_display::projection";
    /// Enumerator re-index span.
    pub const RE_INDEX: &str = "horizon_display::re_index";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_display_core::signal";
    /// Enumerator target.
    pub const ENUMERATOR: &str = "horizon_display::enumerator";
    /// Items strategy target.
    pub const STRATEGY: &str = "horizon_display::strategy";
    /// Projection target.
    pub const PROJECTION: &str = "horizon_display::projection";
}

/// Style options for item tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line-per-item representation.
    Compact,
}

/// Configuration for item tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show each item's display position.
    pub show_positions: bool,
    /// Whether to show the item kind (record, group, breadcrumbs).
    pub show_kinds: bool,
    /// Maximum depth to render (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_positions: true,
            show_kinds: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for minimal output: labels only.
    pub fn minimal() -> Self {
        Self {
            show_positions: false,
            show_kinds: false,
            ..Default::default()
        }
    }

    /// Build the prefix string for a line at the given depth.
    pub fn prefix(&self, depth: usize) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner) = match self.style {
            TreeStyle::Ascii => ("|", "+-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            for _ in 0..self.indent_size {
                prefix.push(' ');
            }
        }
        prefix.push_str(corner);
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span for the named operation.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_display::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
