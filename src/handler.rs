//! Hickory request handler that answers from the client cache and delegates
//! everything else to the next handler in the chain.

use async_trait::async_trait;
use hickory_proto::op::{Header, ResponseCode};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tracing::{debug, error};

use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::Resolver;

/// First stage of a two-stage handler chain.
///
/// A request is answered here when at least one of its questions matches a
/// cached client record; otherwise it is handed to `next` untouched.
pub struct UnifiNamesHandler<N> {
    resolver: Resolver,
    next: N,
}

impl<N> UnifiNamesHandler<N> {
    /// Chain `resolver` in front of `next`.
    pub fn new(resolver: Resolver, next: N) -> Self {
        Self { resolver, next }
    }
}

#[async_trait]
impl<N: RequestHandler> RequestHandler for UnifiNamesHandler<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let answers = self.resolver.resolve(request.queries()).await;

        if answers.is_empty() {
            metrics::record_query(QueryResult::Passed, timer.elapsed());
            return self.next.handle_request(request, response_handle).await;
        }

        debug!(
            id = request.id(),
            answers = answers.len(),
            "answering request"
        );

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_response_code(ResponseCode::NoError);

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            answers.iter(),
            &[],
            &[],
            &[],
        );

        let info = match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "unable to send response");
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        };

        metrics::record_query(QueryResult::Answered, timer.elapsed());
        info
    }
}
