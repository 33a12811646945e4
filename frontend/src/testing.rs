//! Test fixtures shared by the module tests

use crate::errors::TransportError;
use crate::transport::{Request, Transport};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use shared::Envelope;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

type Response = Result<Value, TransportError>;

/// In-memory backend keyed by request path.
///
/// `respond` installs a canned answer that every later request gets;
/// `hold` queues a one-off answer the test resolves whenever it likes, which
/// is how out-of-order completions are staged. Unknown paths answer 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: RefCell<HashMap<String, Response>>,
    held: RefCell<HashMap<String, VecDeque<oneshot::Receiver<Response>>>>,
    requests: RefCell<Vec<Request>>,
}

impl FakeTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.responses.borrow_mut().insert(path.to_string(), response);
    }

    pub fn hold(&self, path: &str) -> oneshot::Sender<Response> {
        let (reply, response) = oneshot::channel();
        self.held
            .borrow_mut()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        reply
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

impl Transport for FakeTransport {
    fn request(&self, request: Request) -> LocalBoxFuture<'static, Result<Envelope<Value>, TransportError>> {
        self.requests.borrow_mut().push(request.clone());

        let held = self
            .held
            .borrow_mut()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        if let Some(response) = held {
            return Box::pin(async move {
                response
                    .await
                    .unwrap_or_else(|_| Err(TransportError::network()))
                    .map(Envelope::new)
            });
        }

        let response = self
            .responses
            .borrow()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::new(404)));
        Box::pin(async move { response.map(Envelope::new) })
    }
}
