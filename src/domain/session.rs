use super::state::State;
use tokio::time::Instant;

/// The single in-flight record of kiosk activity, from payment start to reset.
///
/// Owned by the orchestrator and only mutated while its lock is held.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Current state of the kiosk.
    pub state: State,
    /// Identifier of the outstanding checkout, if any.
    pub transaction_id: Option<String>,
    /// Human-readable code the provider attaches to the transaction.
    pub transaction_label: Option<String>,
    /// Photos captured so far in this session.
    pub photo_count: u32,
    /// When `state` last changed; the watchdog measures inactivity from here.
    pub last_state_change: Instant,
    /// Bumped on every reset so that background tasks can tell their session is gone.
    pub epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            transaction_id: None,
            transaction_label: None,
            photo_count: 0,
            last_state_change: Instant::now(),
            epoch: 0,
        }
    }

    /// Moves to `next` and stamps the transition time.
    pub fn enter(&mut self, next: State) {
        self.state = next;
        self.last_state_change = Instant::now();
    }

    /// Forgets the transaction and starts a new epoch.
    pub fn clear(&mut self) {
        self.transaction_id = None;
        self.transaction_label = None;
        self.photo_count = 0;
        self.epoch += 1;
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_enter_stamps_transition_time() {
        let mut session = Session::new();
        let before = session.last_state_change;

        tokio::time::advance(Duration::from_secs(3)).await;
        session.enter(State::PaymentInitiated);

        assert_eq!(session.state, State::PaymentInitiated);
        assert_eq!(session.last_state_change - before, Duration::from_secs(3));
    }

    #[test]
    fn test_clear_starts_new_epoch() {
        let mut session = Session::new();
        session.transaction_id = Some("tx-1".to_string());
        session.transaction_label = Some("TCODE".to_string());
        session.photo_count = 2;

        session.clear();

        assert_eq!(session.transaction_id, None);
        assert_eq!(session.transaction_label, None);
        assert_eq!(session.photo_count, 0);
        assert_eq!(session.epoch, 1);
    }
}
