//! Text rendering of display items for logs and test assertions.

use std::fmt;

use horizon_display_core::{Record, TreeFormatOptions};

use crate::item::{DisplayItem, ItemKind};

/// Renders a list of display items as an indented tree.
///
/// Each line is the tree prefix for the item's level, then the optional
/// position and kind tag, then a label. Group headers show their key and
/// breadcrumbs show their path labels joined with `,`.
///
/// ```
/// use horizon_display::{CollectionItem, ItemTreeDebug};
/// use horizon_display_core::TreeFormatOptions;
/// use std::sync::Arc;
///
/// let items = vec![CollectionItem::record(Arc::new(7))];
/// let text = ItemTreeDebug::new(&items)
///     .with_options(TreeFormatOptions::minimal())
///     .to_string();
/// assert_eq!(text, "7\n");
/// ```
pub struct ItemTreeDebug<'a, T> {
    items: &'a [DisplayItem<T>],
    options: TreeFormatOptions,
    label: Box<dyn Fn(&T) -> String + 'a>,
}

impl<'a, T: fmt::Debug> ItemTreeDebug<'a, T> {
    /// Labels records with their `Debug` output.
    pub fn new(items: &'a [DisplayItem<T>]) -> Self {
        Self::with_label(items, |record| format!("{record:?}"))
    }
}

impl<'a, T: Record> ItemTreeDebug<'a, T> {
    /// Labels records with the value of `field`.
    pub fn with_field(items: &'a [DisplayItem<T>], field: &'a str) -> Self {
        Self::with_label(items, move |record| {
            record.get(field).map(|value| value.to_string()).unwrap_or_default()
        })
    }
}

impl<'a, T> ItemTreeDebug<'a, T> {
    /// Labels records with `label`.
    pub fn with_label<F>(items: &'a [DisplayItem<T>], label: F) -> Self
    where
        F: Fn(&T) -> String + 'a,
    {
        Self {
            items,
            options: TreeFormatOptions::default(),
            label: Box::new(label),
        }
    }

    /// Sets the format options.
    pub fn with_options(mut self, options: TreeFormatOptions) -> Self {
        self.options = options;
        self
    }

    fn describe(&self, item: &DisplayItem<T>) -> (&'static str, String) {
        match item.kind() {
            ItemKind::Record(record) => ("record", (self.label)(record.as_ref())),
            ItemKind::Group(key) => ("group", key.to_string()),
            ItemKind::Breadcrumbs(path) => (
                "breadcrumbs",
                path.iter()
                    .map(|record| (self.label)(record.as_ref()))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ItemKind::Decorated(original) => ("decorated", self.describe(original).1),
        }
    }
}

impl<T> fmt::Display for ItemTreeDebug<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, item) in self.items.iter().enumerate() {
            let depth = item.level();
            if self.options.max_depth.is_some_and(|max| depth > max) {
                continue;
            }
            write!(f, "{}", self.options.prefix(depth))?;
            if self.options.show_positions {
                write!(f, "[{position}] ")?;
            }
            let (kind, label) = self.describe(item);
            if self.options.show_kinds {
                write!(f, "{kind}: ")?;
            }
            writeln!(f, "{label}")?;
        }
        Ok(())
    }
}
