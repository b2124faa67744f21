use crate::{
    companion::CompanionLink,
    event::{CompanionEvent, FaceEvent, SessionId},
};
use log::{debug, error, info};
use std::{
    sync::{mpsc::Sender, Arc},
    thread,
};

/// Lifecycle of the session with the companion. Connecting happens on a
/// worker; the result comes back through the event queue and is fed to
/// [Self::on_connected] or [Self::on_failed]. There are no retries: a failed
/// session stays down until the face is shown again.
#[derive(Debug)]
pub struct ConnectionManager<L> {
    link: Arc<L>,
    sender: Sender<FaceEvent>,
    session: Session,
    /// ID for the next connection attempt
    next_session: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Session {
    Disconnected,
    Connecting(SessionId),
    Connected(SessionId),
}

impl<L: CompanionLink> ConnectionManager<L> {
    pub fn new(link: Arc<L>, sender: Sender<FaceEvent>) -> Self {
        Self {
            link,
            sender,
            session: Session::Disconnected,
            next_session: 0,
        }
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.session, Session::Connected(_))
    }

    /// Start connecting, unless we're already connected or on our way
    pub fn connect(&mut self) {
        if self.session != Session::Disconnected {
            debug!("Already connecting/connected: {:?}", self.session);
            return;
        }

        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.session = Session::Connecting(session);
        info!("Connecting to companion {} ({session:?})", self.link.name());

        let link = Arc::clone(&self.link);
        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = match link.connect() {
                Ok(()) => CompanionEvent::Connected(session),
                Err(error) => {
                    CompanionEvent::ConnectionFailed { session, error }
                }
            };
            let _ = sender.send(event.into());
        });
    }

    /// Connection attempt succeeded. Returns whether the session is still
    /// wanted; if not, it gets torn down.
    pub fn on_connected(&mut self, session: SessionId) -> bool {
        match self.session {
            Session::Connecting(current) if current == session => {
                info!("Connected to companion ({session:?})");
                self.session = Session::Connected(session);
                true
            }
            Session::Disconnected => {
                // We were hidden while this was in flight
                debug!("Dropping abandoned session {session:?}");
                self.link.disconnect();
                false
            }
            _ => {
                debug!("Ignoring stale session {session:?}");
                false
            }
        }
    }

    /// Connection attempt failed. Log it and give up.
    pub fn on_failed(&mut self, session: SessionId, error: &anyhow::Error) {
        if self.session == Session::Connecting(session) {
            error!("Failed to connect to companion: {error:#}");
            self.session = Session::Disconnected;
        } else {
            debug!("Ignoring failure of stale session {session:?}: {error:#}");
        }
    }

    /// An established session dropped. Returns whether it was the current
    /// one.
    pub fn on_suspended(&mut self, session: SessionId) -> bool {
        if self.session == Session::Connected(session) {
            info!("Companion session suspended ({session:?})");
            self.link.disconnect();
            self.session = Session::Disconnected;
            true
        } else {
            false
        }
    }

    /// Tear down the session. Deregister any listeners first!
    pub fn disconnect(&mut self) {
        match self.session {
            Session::Disconnected => {}
            // The worker will report back, and on_connected will clean up
            Session::Connecting(session) => {
                debug!("Abandoning connection attempt {session:?}");
            }
            Session::Connected(session) => {
                info!("Disconnecting from companion ({session:?})");
                self.link.disconnect();
            }
        }
        self.session = Session::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::memory::MemoryLink;
    use std::{
        sync::mpsc::{self, Receiver},
        time::Duration,
    };

    fn manager(
        link: MemoryLink,
    ) -> (ConnectionManager<MemoryLink>, Arc<MemoryLink>, Receiver<FaceEvent>)
    {
        let link = Arc::new(link);
        let (sender, receiver) = mpsc::channel();
        (
            ConnectionManager::new(Arc::clone(&link), sender),
            link,
            receiver,
        )
    }

    fn next_event(receiver: &Receiver<FaceEvent>) -> CompanionEvent {
        match receiver.recv_timeout(Duration::from_secs(5)).unwrap() {
            FaceEvent::Companion(event) => event,
            other => panic!("Unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_connect() {
        let (mut manager, link, receiver) = manager(MemoryLink::new());
        manager.connect();
        let CompanionEvent::Connected(session) = next_event(&receiver) else {
            panic!("Expected connection");
        };
        assert_eq!(manager.session(), Session::Connecting(session));
        assert!(manager.on_connected(session));
        assert!(manager.is_connected());
        assert!(link.is_connected());

        // Connecting again is a no-op
        manager.connect();
        assert_eq!(manager.session(), Session::Connected(session));

        manager.disconnect();
        assert_eq!(manager.session(), Session::Disconnected);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_connect_failure() {
        let (mut manager, link, receiver) = manager(MemoryLink::refusing(8));
        manager.connect();
        let CompanionEvent::ConnectionFailed { session, error } =
            next_event(&receiver)
        else {
            panic!("Expected failure");
        };
        assert!(error.to_string().contains("code 8"));
        manager.on_failed(session, &error);
        assert_eq!(manager.session(), Session::Disconnected);
        assert!(!link.is_connected());
        // No retry
        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_abandoned_session() {
        let (mut manager, link, receiver) = manager(MemoryLink::new());
        manager.connect();
        manager.disconnect();
        let CompanionEvent::Connected(session) = next_event(&receiver) else {
            panic!("Expected connection");
        };
        assert!(!manager.on_connected(session));
        assert_eq!(manager.session(), Session::Disconnected);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_stale_session() {
        let (mut manager, _link, receiver) = manager(MemoryLink::new());
        manager.connect();
        manager.disconnect();
        manager.connect();
        let first = next_event(&receiver);
        let second = next_event(&receiver);
        let (CompanionEvent::Connected(a), CompanionEvent::Connected(b)) =
            (first, second)
        else {
            panic!("Expected connections");
        };
        // Workers can finish in either order
        let (old, new) = if a == SessionId(0) { (a, b) } else { (b, a) };
        assert!(!manager.on_connected(old));
        assert!(manager.on_connected(new));
        assert_eq!(manager.session(), Session::Connected(SessionId(1)));
    }

    #[test]
    fn test_suspended() {
        let (mut manager, link, receiver) = manager(MemoryLink::new());
        manager.connect();
        let CompanionEvent::Connected(session) = next_event(&receiver) else {
            panic!("Expected connection");
        };
        manager.on_connected(session);
        assert!(!manager.on_suspended(SessionId(99)));
        assert!(manager.on_suspended(session));
        assert_eq!(manager.session(), Session::Disconnected);
        assert!(!link.is_connected());
    }
}
