use crate::domain::timer::TimerPhase;
use crate::infrastructure::error::InfraError;
use notify_rust::Notification;
use std::io::Write;
use std::str::FromStr;

const APP_NAME: &str = "pomotask";

/// Plays the short cue at the end of a timer phase.
pub trait NotificationPlayer: Send + Sync {
    fn play(&self, ended: TimerPhase) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Desktop,
    Bell,
    Silent,
}

impl FromStr for NotificationKind {
    type Err = InfraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "bell" => Ok(Self::Bell),
            "silent" | "none" | "off" => Ok(Self::Silent),
            other => Err(InfraError::InvalidConfig(format!(
                "unsupported notification kind: {other}"
            ))),
        }
    }
}

pub fn player_for(kind: NotificationKind) -> Box<dyn NotificationPlayer> {
    match kind {
        NotificationKind::Desktop => Box::new(DesktopNotificationPlayer),
        NotificationKind::Bell => Box::new(TerminalBellPlayer),
        NotificationKind::Silent => Box::new(SilentPlayer),
    }
}

fn cue_text(ended: TimerPhase) -> (&'static str, &'static str) {
    match ended {
        TimerPhase::Focus => ("Break time", "Focus session finished. Step away for a bit."),
        TimerPhase::Break => ("Back to work", "Break is over. Next focus session is running."),
    }
}

/// Desktop notification through the platform notification service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotificationPlayer;

impl NotificationPlayer for DesktopNotificationPlayer {
    fn play(&self, ended: TimerPhase) -> Result<(), InfraError> {
        let (summary, body) = cue_text(ended);
        Notification::new()
            .summary(summary)
            .body(body)
            .appname(APP_NAME)
            .show()
            .map(|_| ())
            .map_err(|error| {
                InfraError::Notification(format!("desktop notification failed: {error}"))
            })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBellPlayer;

impl NotificationPlayer for TerminalBellPlayer {
    fn play(&self, _ended: TimerPhase) -> Result<(), InfraError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .map_err(|error| InfraError::Notification(format!("terminal bell failed: {error}")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl NotificationPlayer for SilentPlayer {
    fn play(&self, _ended: TimerPhase) -> Result<(), InfraError> {
        Ok(())
    }
}
