use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use crate::error::RSocketError;
use crate::payload::Payload;
use crate::streams::PayloadStream;

/// The four interaction models plus metadata push.
///
/// This trait is implemented by a connection for the requester side (calls are sent to the peer),
///  and by application code for the responder side (requests received from the peer are handled
///  by it). All methods have defaults that reject the request, so a responder only needs to
///  implement the interactions it supports.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RSocket: Send + Sync + 'static {
    async fn metadata_push(&self, _metadata: Bytes) -> Result<(), RSocketError> {
        Err(not_implemented("metadata push"))
    }

    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), RSocketError> {
        Err(not_implemented("fire and forget"))
    }

    async fn request_response(&self, _payload: Payload) -> Result<Payload, RSocketError> {
        Err(not_implemented("request response"))
    }

    async fn request_stream(&self, _payload: Payload) -> Result<PayloadStream, RSocketError> {
        Err(not_implemented("request stream"))
    }

    /// `payloads` is the sequence of payloads following `initial`: on the requester side it is
    ///  sent to the peer, on the responder side it is received from the peer.
    async fn request_channel(&self, _initial: Payload, _payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        Err(not_implemented("request channel"))
    }
}

fn not_implemented(interaction: &str) -> RSocketError {
    RSocketError::ApplicationError(format!("{} is not implemented", interaction))
}

/// A responder that rejects all requests
pub struct EmptyResponder;

impl RSocket for EmptyResponder {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_responder_rejects() {
        let responder = EmptyResponder;
        assert_eq!(
            responder.request_response(Payload::empty()).await,
            Err(RSocketError::ApplicationError("request response is not implemented".to_string()))
        );
        assert!(responder.fire_and_forget(Payload::empty()).await.is_err());
        assert!(responder.metadata_push(Bytes::new()).await.is_err());
    }
}
