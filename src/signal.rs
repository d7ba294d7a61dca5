use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{Authorization, Id};

/// Channel every saga holding funds on `debit` listens on.
pub fn channel_key(debit: Id) -> String {
    format!("presentmentMatched_{}", debit)
}

type MailboxKey = (String, String);

/// Routes match signals to waiting sagas.
///
/// A mailbox accepts exactly one signal. Delivery and disarming both take
/// the bus lock, so for each mailbox either a signal got in before it was
/// disarmed, or every later signal is refused.
#[derive(Default, Debug)]
pub struct SignalBus {
    mailboxes: Mutex<HashMap<MailboxKey, oneshot::Sender<Authorization>>>,
}

impl SignalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MailboxKey, oneshot::Sender<Authorization>>> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn arm(self: &Arc<Self>, saga_id: &str, channel: &str) -> Mailbox {
        let (tx, rx) = oneshot::channel();
        let key = (saga_id.to_string(), channel.to_string());
        self.lock().insert(key.clone(), tx);
        debug!(saga_id, channel, "mailbox armed");
        Mailbox {
            bus: Arc::clone(self),
            key,
            rx,
        }
    }

    /// Returns whether the target saga accepted the signal.
    pub fn send(&self, saga_id: &str, channel: &str, payload: Authorization) -> bool {
        let mut mailboxes = self.lock();
        let key = (saga_id.to_string(), channel.to_string());
        match mailboxes.remove(&key) {
            // sent while still holding the lock
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn armed(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, key: &MailboxKey) {
        self.lock().remove(key);
    }
}

/// Receiving end of one saga's signal channel.
#[derive(Debug)]
pub struct Mailbox {
    bus: Arc<SignalBus>,
    key: MailboxKey,
    rx: oneshot::Receiver<Authorization>,
}

impl Mailbox {
    /// Resolves once a signal is delivered. Pends forever if the mailbox is
    /// disarmed without one.
    pub async fn recv(&mut self) -> Authorization {
        match (&mut self.rx).await {
            Ok(auth) => auth,
            Err(_) => std::future::pending().await,
        }
    }

    /// Refuses all further signals and returns one that slipped in first.
    pub fn disarm(&mut self) -> Option<Authorization> {
        self.bus.remove(&self.key);
        self.rx.try_recv().ok()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.bus.remove(&self.key);
    }
}
