// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use thread_local::ThreadLocal;

/// Date formatter that parses its pattern once per worker thread.
pub struct TimestampFormatter {
    pattern: &'static str,
    items: ThreadLocal<Vec<Item<'static>>>,
}

impl TimestampFormatter {
    pub fn new(pattern: &'static str) -> Self {
        Self {
            pattern,
            items: ThreadLocal::new(),
        }
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn format(&self, at: &DateTime<Local>) -> String {
        let items = self
            .items
            .get_or(|| StrftimeItems::new(self.pattern).collect());
        at.format_with_items(items.iter()).to_string()
    }

    pub fn now(&self) -> String {
        self.format(&Local::now())
    }
}

impl fmt::Debug for TimestampFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampFormatter")
            .field("pattern", &self.pattern)
            .finish()
    }
}
