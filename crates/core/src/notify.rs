//! Operator notifications.
//!
//! Every send is best-effort: delivery failures are logged and reported as
//! `false`, never raised. Message bodies use Telegram HTML markup.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::liquidator::LiquidationOutcome;
use crate::position::TrackedPosition;
use crate::position_tracker::CloseReason;
use stoploss_api::Notifier;

/// How a closed position ended, judged from its last observed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseResult {
    Won,
    Lost,
    Profit,
    Closed,
}

impl CloseResult {
    pub fn classify(last_price: f64, pnl_pct: f64) -> Self {
        if last_price >= 1.0 {
            Self::Won
        } else if last_price <= 0.0 {
            Self::Lost
        } else if pnl_pct >= 0.0 {
            Self::Profit
        } else {
            Self::Closed
        }
    }

    fn emoji(&self) -> &'static str {
        match self {
            Self::Won => "🎉",
            Self::Lost => "📉",
            Self::Profit => "✅",
            Self::Closed => "📊",
        }
    }
}

impl fmt::Display for CloseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::Profit => "PROFIT",
            Self::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

/// Escape text for Telegram HTML parse mode.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn format_started(threshold_pct: f64) -> String {
    format!("Polymarket SL Bot started. Monitoring for {}% stop-loss.", threshold_pct)
}

pub fn format_stopped() -> String {
    "Polymarket SL Bot stopped by user.".to_string()
}

pub fn format_new_position(position: &TrackedPosition, threshold_pct: f64) -> String {
    format!(
        "<b>NEW POSITION DETECTED</b>\n\n\
         Market: {}\n\
         Outcome: {}\n\
         Entry: {:.4}\n\
         Size: {:.2} shares\n\
         Stop-Loss: {}% (triggers at {:.4})",
        escape_html(&position.market_title),
        escape_html(&position.outcome),
        position.entry_price,
        position.size,
        threshold_pct,
        position.trigger_price(threshold_pct),
    )
}

/// Stop-loss result report. Prices and size are those observed when the trigger fired.
pub fn format_stop_loss(position: &TrackedPosition, drop_pct: f64, outcome: &LiquidationOutcome) -> String {
    let (emoji, status) = if outcome.success {
        ("✅", "EXECUTED")
    } else {
        ("❌", "FAILED")
    };

    let mut msg = format!(
        "<b>{} STOP-LOSS {}</b>\n\n\
         <b>Market:</b> {}\n\
         <b>Outcome:</b> {}\n\
         <b>Entry Price:</b> ${:.4}\n\
         <b>Exit Price:</b> ${:.4}\n\
         <b>Loss:</b> -{:.2}%\n\
         <b>Shares Sold:</b> {:.2}\n",
        emoji,
        status,
        escape_html(&position.market_title),
        escape_html(&position.outcome),
        position.entry_price,
        position.last_price,
        drop_pct,
        position.size,
    );

    match &outcome.order_id {
        Some(id) => msg.push_str(&format!("<b>Order ID:</b> <code>{}</code>", escape_html(id))),
        None if !outcome.success => msg.push_str("<b>Note:</b> Order may need manual intervention"),
        None => {}
    }
    msg
}

pub fn format_position_closed(position: &TrackedPosition, reason: CloseReason) -> String {
    let pnl = position.pnl_pct();
    let result = CloseResult::classify(position.last_price, pnl);
    let sign = if pnl >= 0.0 { "+" } else { "" };

    format!(
        "<b>{} POSITION {}</b>\n\n\
         <b>Market:</b> {}\n\
         <b>Outcome:</b> {}\n\
         <b>Entry Price:</b> ${:.4}\n\
         <b>Final Price:</b> ${:.4}\n\
         <b>P/L:</b> {}{:.2}%\n\
         <b>Shares:</b> {:.2}\n\
         <b>Reason:</b> {}",
        result.emoji(),
        result,
        escape_html(&position.market_title),
        escape_html(&position.outcome),
        position.entry_price,
        position.last_price,
        sign,
        pnl,
        position.size,
        reason,
    )
}

pub fn format_error(message: &str) -> String {
    format!("<b>Bot Error:</b> {}", escape_html(message))
}

/// Best-effort notification dispatcher honoring the configured toggles.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    notifier: Option<Arc<dyn Notifier>>,
    toggles: TelegramConfig,
}

impl NotificationSink {
    /// `None` disables chat delivery entirely (missing credentials).
    pub fn new(notifier: Option<Arc<dyn Notifier>>, toggles: TelegramConfig) -> Self {
        Self { notifier, toggles }
    }

    pub async fn started(&self, threshold_pct: f64) -> bool {
        if !self.toggles.notify_on_start {
            return false;
        }
        self.deliver(&format_started(threshold_pct)).await
    }

    pub async fn new_position(&self, position: &TrackedPosition, threshold_pct: f64) -> bool {
        self.deliver(&format_new_position(position, threshold_pct)).await
    }

    pub async fn stop_loss(&self, position: &TrackedPosition, drop_pct: f64, outcome: &LiquidationOutcome) -> bool {
        if !self.toggles.notify_on_stop_loss {
            return false;
        }
        self.deliver(&format_stop_loss(position, drop_pct, outcome)).await
    }

    pub async fn position_closed(&self, position: &TrackedPosition, reason: CloseReason) -> bool {
        self.deliver(&format_position_closed(position, reason)).await
    }

    pub async fn error(&self, message: &str) -> bool {
        if !self.toggles.notify_on_error {
            return false;
        }
        self.deliver(&format_error(message)).await
    }

    pub async fn stopped(&self) -> bool {
        self.deliver(&format_stopped()).await
    }

    async fn deliver(&self, text: &str) -> bool {
        if !self.toggles.enabled {
            debug!("Telegram notifications disabled");
            return false;
        }
        let Some(notifier) = &self.notifier else {
            debug!("Telegram not configured, skipping notification");
            return false;
        };

        match notifier.send(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to send Telegram notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("chat unreachable");
            }
            self.sent.lock().push(text.to_string());
            Ok(())
        }
    }

    fn tracked(entry: f64, last: f64) -> TrackedPosition {
        TrackedPosition {
            asset_id: "A".to_string(),
            market_title: "Will <X> happen?".to_string(),
            outcome: "Yes".to_string(),
            entry_price: entry,
            last_price: last,
            size: 12.5,
            tracked_since: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    fn outcome(success: bool, order_id: Option<&str>) -> LiquidationOutcome {
        LiquidationOutcome {
            success,
            order_id: order_id.map(str::to_string),
            error: None,
            shares: 12.5,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_close_result_classification() {
        assert_eq!(CloseResult::classify(1.0, 100.0), CloseResult::Won);
        assert_eq!(CloseResult::classify(0.0, -100.0), CloseResult::Lost);
        assert_eq!(CloseResult::classify(0.6, 20.0), CloseResult::Profit);
        assert_eq!(CloseResult::classify(0.5, 0.0), CloseResult::Profit);
        assert_eq!(CloseResult::classify(0.4, -20.0), CloseResult::Closed);
    }

    #[test]
    fn test_new_position_message() {
        let msg = format_new_position(&tracked(0.5, 0.5), 10.0);
        assert!(msg.starts_with("<b>NEW POSITION DETECTED</b>"));
        assert!(msg.contains("Will &lt;X&gt; happen?"));
        assert!(msg.contains("Entry: 0.5000"));
        assert!(msg.contains("Size: 12.50 shares"));
        assert!(msg.contains("triggers at 0.4500"));
    }

    #[test]
    fn test_stop_loss_message() {
        let position = tracked(0.65, 0.55);
        let ok = format_stop_loss(&position, 15.3846, &outcome(true, Some("0xabc")));
        assert!(ok.contains("STOP-LOSS EXECUTED"));
        assert!(ok.contains("<b>Loss:</b> -15.38%"));
        assert!(ok.contains("<code>0xabc</code>"));

        let failed = format_stop_loss(&position, 15.3846, &outcome(false, None));
        assert!(failed.contains("STOP-LOSS FAILED"));
        assert!(failed.contains("manual intervention"));
    }

    #[test]
    fn test_position_closed_message() {
        let msg = format_position_closed(&tracked(0.5, 0.6), CloseReason::MarketResolved);
        assert!(msg.contains("POSITION PROFIT"));
        assert!(msg.contains("<b>P/L:</b> +20.00%"));
        assert!(msg.contains("<b>Reason:</b> Market Resolved"));

        let msg = format_position_closed(&tracked(0.5, 0.4), CloseReason::PositionClosed);
        assert!(msg.contains("POSITION CLOSED"));
        assert!(msg.contains("<b>P/L:</b> -20.00%"));
    }

    #[tokio::test]
    async fn test_toggles_are_honored() {
        let notifier = Arc::new(RecordingNotifier::default());
        let toggles = TelegramConfig {
            notify_on_start: false,
            notify_on_error: false,
            ..Default::default()
        };
        let sink = NotificationSink::new(Some(notifier.clone()), toggles);

        assert!(!sink.started(10.0).await);
        assert!(!sink.error("boom").await);
        assert!(sink.stopped().await);
        assert!(sink.stop_loss(&tracked(0.5, 0.4), 20.0, &outcome(true, Some("1"))).await);

        assert_eq!(notifier.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_master_switch_disables_everything() {
        let notifier = Arc::new(RecordingNotifier::default());
        let toggles = TelegramConfig {
            enabled: false,
            ..Default::default()
        };
        let sink = NotificationSink::new(Some(notifier.clone()), toggles);

        assert!(!sink.new_position(&tracked(0.5, 0.5), 10.0).await);
        assert!(!sink.position_closed(&tracked(0.5, 0.5), CloseReason::PositionClosed).await);
        assert!(notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let sink = NotificationSink::new(Some(notifier), TelegramConfig::default());
        assert!(!sink.error("boom").await);

        let unconfigured = NotificationSink::new(None, TelegramConfig::default());
        assert!(!unconfigured.stopped().await);
    }
}
