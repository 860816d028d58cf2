use std::sync::Arc;
use crate::connection::ConnectionAcceptor;
use crate::rsocket::RSocket;

/// Wraps a requester or responder, e.g. to record or decorate requests
pub type RSocketInterceptor = Arc<dyn Fn(Arc<dyn RSocket>) -> Arc<dyn RSocket> + Send + Sync>;
pub type AcceptorInterceptor = Arc<dyn Fn(Arc<dyn ConnectionAcceptor>) -> Arc<dyn ConnectionAcceptor> + Send + Sync>;

/// Interceptors of a connector or server, applied in the order they were added: the first one
///  wraps the connection (or the application's responder / acceptor), and the last one is what
///  the caller talks to.
#[derive(Clone, Default)]
pub struct Interceptors {
    requesters: Vec<RSocketInterceptor>,
    responders: Vec<RSocketInterceptor>,
    acceptors: Vec<AcceptorInterceptor>,
}

impl Interceptors {
    pub fn new() -> Interceptors {
        Interceptors::default()
    }

    /// Wraps the requester side of each connection, see [crate::connection::Connection::requester]
    pub fn requester(mut self, interceptor: impl Fn(Arc<dyn RSocket>) -> Arc<dyn RSocket> + Send + Sync + 'static) -> Interceptors {
        self.requesters.push(Arc::new(interceptor));
        self
    }

    /// Wraps the responder that handles the peer's requests
    pub fn responder(mut self, interceptor: impl Fn(Arc<dyn RSocket>) -> Arc<dyn RSocket> + Send + Sync + 'static) -> Interceptors {
        self.responders.push(Arc::new(interceptor));
        self
    }

    pub fn acceptor(mut self, interceptor: impl Fn(Arc<dyn ConnectionAcceptor>) -> Arc<dyn ConnectionAcceptor> + Send + Sync + 'static) -> Interceptors {
        self.acceptors.push(Arc::new(interceptor));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requesters.is_empty() && self.responders.is_empty() && self.acceptors.is_empty()
    }

    pub fn intercept_requester(&self, requester: Arc<dyn RSocket>) -> Arc<dyn RSocket> {
        self.requesters.iter()
            .fold(requester, |rsocket, interceptor| interceptor(rsocket))
    }

    pub fn intercept_responder(&self, responder: Arc<dyn RSocket>) -> Arc<dyn RSocket> {
        self.responders.iter()
            .fold(responder, |rsocket, interceptor| interceptor(rsocket))
    }

    pub fn intercept_acceptor(&self, acceptor: Arc<dyn ConnectionAcceptor>) -> Arc<dyn ConnectionAcceptor> {
        self.acceptors.iter()
            .fold(acceptor, |acceptor, interceptor| interceptor(acceptor))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use crate::connection::ConnectionSetup;
    use crate::error::RSocketError;
    use crate::payload::Payload;
    use crate::test_util::responder::PingPongResponder;
    use super::*;

    /// appends its tag to every response
    struct Tagging {
        delegate: Arc<dyn RSocket>,
        tag: &'static str,
    }

    #[async_trait]
    impl RSocket for Tagging {
        async fn request_response(&self, payload: Payload) -> Result<Payload, RSocketError> {
            let response = self.delegate.request_response(payload).await?;
            Ok(Payload::from_data(format!("{}{}", response.data_utf8(), self.tag)))
        }
    }

    fn tag(tag: &'static str) -> impl Fn(Arc<dyn RSocket>) -> Arc<dyn RSocket> + Send + Sync + 'static {
        move |delegate: Arc<dyn RSocket>| Arc::new(Tagging { delegate, tag }) as Arc<dyn RSocket>
    }

    #[tokio::test]
    async fn test_requesters_in_order() {
        let interceptors = Interceptors::new()
            .requester(tag("-a"))
            .requester(tag("-b"));

        let requester = interceptors.intercept_requester(Arc::new(PingPongResponder));
        assert_eq!(requester.request_response(Payload::from_data("ping")).await, Ok(Payload::from_data("pong-a-b")));
    }

    #[tokio::test]
    async fn test_responders_are_separate() {
        let interceptors = Interceptors::new()
            .responder(tag("-r"));

        let requester = interceptors.intercept_requester(Arc::new(PingPongResponder));
        let responder = interceptors.intercept_responder(Arc::new(PingPongResponder));
        assert_eq!(requester.request_response(Payload::from_data("ping")).await, Ok(Payload::from_data("pong")));
        assert_eq!(responder.request_response(Payload::from_data("ping")).await, Ok(Payload::from_data("pong-r")));
    }

    #[tokio::test]
    async fn test_acceptor() {
        let interceptors = Interceptors::new()
            .acceptor(|_| Arc::new(|_: &ConnectionSetup, _: Arc<dyn RSocket>| {
                Err::<Arc<dyn RSocket>, _>(RSocketError::RejectedSetup("maintenance".to_string()))
            }) as Arc<dyn ConnectionAcceptor>);

        let acceptor: Arc<dyn ConnectionAcceptor> = Arc::new(|_: &ConnectionSetup, _: Arc<dyn RSocket>| {
            Ok(Arc::new(PingPongResponder) as Arc<dyn RSocket>)
        });
        let acceptor = interceptors.intercept_acceptor(acceptor);

        let setup = ConnectionSetup::from_config(&crate::config::RSocketConfig::new());
        let result = acceptor.accept(&setup, Arc::new(PingPongResponder)).await;
        assert_eq!(result.err(), Some(RSocketError::RejectedSetup("maintenance".to_string())));
    }

    #[test]
    fn test_empty() {
        assert!(Interceptors::new().is_empty());
        assert!(!Interceptors::new().responder(tag("x")).is_empty());
    }
}
