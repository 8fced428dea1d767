use std::io::Write;

use console::Style;

use super::{Categorized, Notifier};
use crate::backlog::WorkItem;
use crate::error::DrillError;

/// Prints the batch to stdout. Used when no webhook is configured.
pub struct ConsoleNotifier {
    heading: Style,
    carried: Style,
    new: Style,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self {
            heading: Style::new().cyan().bold(),
            carried: Style::new().yellow(),
            new: Style::new().green(),
        }
    }
}

impl ConsoleNotifier {
    pub fn render(&self, batch: &[WorkItem], categorized: &Categorized) -> String {
        let mut out = format!(
            "{}\n",
            self.heading.apply_to(format!("Today's problems ({})", batch.len()))
        );
        for item in &categorized.unfinished {
            out.push_str(&format!(
                "  {} {} [{}]\n",
                self.carried.apply_to("↻"),
                item.display_name,
                item.difficulty
            ));
        }
        for item in &categorized.fresh {
            out.push_str(&format!(
                "  {} {} [{}]\n",
                self.new.apply_to("+"),
                item.display_name,
                item.difficulty
            ));
        }
        out
    }

    fn deliver(
        &self,
        out: &mut impl Write,
        batch: &[WorkItem],
        categorized: &Categorized,
    ) -> Result<(), DrillError> {
        out.write_all(self.render(batch, categorized).as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| DrillError::Notification(format!("console: {e}")))
    }
}

impl Notifier for ConsoleNotifier {
    async fn send(&self, batch: &[WorkItem], categorized: &Categorized) -> Result<(), DrillError> {
        self.deliver(&mut std::io::stdout().lock(), batch, categorized)
    }
}
