//! Outbound notifications: Telegram transport and message rendering.

mod format;
mod telegram;

pub use format::{fmt_pct, fmt_qty, fmt_usd, pct_of, render_run_summary};
pub use telegram::TelegramNotifier;
