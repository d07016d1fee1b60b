use crate::application::errors::TransportError;
use crate::domain::entities::Response;
use crate::domain::traits::Transport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delivers plugin responses through the transport
#[derive(Clone)]
pub struct MessageService {
    transport: Arc<dyn Transport>,
}

impl MessageService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Deliver responses in order. Failures are logged and dropped; returns
    /// how many responses reached the platform.
    pub async fn deliver(&self, responses: Vec<Response>) -> usize {
        let mut delivered = 0;
        for response in responses {
            if response.is_none() {
                continue;
            }
            match self.send(&response).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(error = %e, ?response, "Dropping response after delivery failure"),
            }
        }
        delivered
    }

    /// Send one response, retrying rate-limited calls.
    pub async fn send(&self, response: &Response) -> Result<(), TransportError> {
        let mut attempt = 1;
        loop {
            let result = match response {
                Response::Message { destination, content } => self
                    .transport
                    .send_message(destination, content)
                    .await
                    .map(|_| ()),
                Response::Reaction { message_id, emoji } => {
                    self.transport.add_reaction(*message_id, emoji).await
                }
                Response::None => Ok(()),
            };
            match result {
                Err(TransportError::RateLimited { retry_after }) if attempt < MAX_ATTEMPTS => {
                    let wait = retry_after.min(MAX_BACKOFF);
                    debug!(attempt, ?wait, "Rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Destination;
    use crate::test_support::Harness;

    fn rate_limited() -> TransportError {
        TransportError::RateLimited {
            retry_after: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_rate_limited_sends() {
        let h = Harness::new();
        h.transport.fail_next(vec![rate_limited(), rate_limited()]);
        let service = MessageService::new(Arc::new(h.transport.clone()));

        let delivered = service.deliver(vec![Response::private(5, "hello")]).await;
        assert_eq!(delivered, 1);
        assert_eq!(h.transport.sent_messages(), vec![(Destination::user(5), "hello".to_string())]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let h = Harness::new();
        h.transport.fail_next(vec![rate_limited(), rate_limited(), rate_limited()]);
        let service = MessageService::new(Arc::new(h.transport.clone()));

        let err = service.send(&Response::reaction(3, "ok")).await.unwrap_err();
        assert!(matches!(err, TransportError::RateLimited { .. }));
        assert!(h.transport.outbound().is_empty());
    }

    #[tokio::test]
    async fn failures_are_dropped_and_delivery_continues() {
        let h = Harness::new();
        h.transport.fail_next(vec![TransportError::Network("reset".into())]);
        let service = MessageService::new(Arc::new(h.transport.clone()));

        let delivered = service
            .deliver(vec![
                Response::private(5, "lost"),
                Response::none(),
                Response::reaction(3, "ok"),
            ])
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(h.transport.reactions(), vec![(3, "ok".to_string())]);
        assert!(h.transport.sent_messages().is_empty());
    }
}
