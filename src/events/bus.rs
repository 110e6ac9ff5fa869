use std::sync::Arc;
use tokio::sync::broadcast;

use super::FleetEvent;

/// In-process pub/sub for fleet events. Publishing never blocks and never
/// fails; slow receivers lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<FleetEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: FleetEvent) {
        log::debug!("Publishing {}", event.name());
        let receivers = self.sender.send(event).unwrap_or(0);
        if receivers == 0 {
            log::debug!("No subscribers listening to fleet events");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                log::warn!("Fleet event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                log::warn!("Fleet event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drains everything currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<FleetEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    pub fn into_inner(self) -> broadcast::Receiver<FleetEvent> {
        self.receiver
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
