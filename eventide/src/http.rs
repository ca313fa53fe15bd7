//! URL transfers driven off the event loop.
//!
//! A transfer is a leaf composable wrapping a `curl` easy/multi pair. The
//! multi's socket callback creates and re-arms poll handles on the loop for
//! every socket the library opens, and its timer callback arms a loop timer;
//! readiness and timeouts feed back through `Multi::action`/`Multi::timeout`
//! until no transfers remain running, at which point the response (or the
//! library's error message) is delivered downstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use curl::easy::{Easy2, Handler, List, WriteError};
use curl::multi::{Easy2Handle, Events, Multi, Socket, SocketEvents};
use mio::Interest;
use thiserror::Error;
use tracing::debug;

use eventide_core::{reschedule_after, Callback, Eventual, Interrupt};

use crate::event_loop::{EventLoop, Readiness};
use crate::resolver::{eventual_interruptible, Resolver};

/// The request methods the client speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// An HTTP GET.
    Get,
    /// An HTTP POST.
    Post,
}

/// A completed transfer: status code and response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code.
    pub code: u32,
    /// The response body.
    pub body: Vec<u8>,
}

/// A transfer failure carrying the URL library's message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HttpError(pub String);

/// A PEM-encoded certificate bundle used for peer verification.
#[derive(Clone, Debug)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    /// Wraps PEM bytes.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Certificate(pem.into())
    }

    /// The PEM bytes.
    pub fn pem(&self) -> &[u8] {
        &self.0
    }
}

/// Ordered `(key, value)` pairs URL-encoded into a POST body.
pub type PostFields = Vec<(String, String)>;

/// A described transfer; build one with [`Request::builder`].
#[derive(Clone, Debug)]
pub struct Request {
    uri: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    timeout: Duration,
    fields: PostFields,
    verify_peer: bool,
    certificate: Option<Certificate>,
}

impl Request {
    /// The request URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The request headers, in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The raw request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The transfer timeout; zero means unbounded.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The POST fields, in insertion order.
    pub fn fields(&self) -> &PostFields {
        &self.fields
    }

    /// Whether the transfer verifies the peer.
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// The certificate bundle, if any.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// Starts building a request; `uri` and `method` are required before
    /// [`build`](RequestBuilder::build) exists.
    pub fn builder() -> RequestBuilder<false, false> {
        RequestBuilder {
            request: Request {
                uri: String::new(),
                method: Method::Get,
                headers: Vec::new(),
                body: Vec::new(),
                timeout: Duration::ZERO,
                fields: Vec::new(),
                verify_peer: true,
                certificate: None,
            },
        }
    }
}

/// Typestate request builder: `build` is only available once both the URI
/// and the method have been supplied.
pub struct RequestBuilder<const HAS_URI: bool, const HAS_METHOD: bool> {
    request: Request,
}

impl<const M: bool> RequestBuilder<false, M> {
    /// Sets the request URI.
    pub fn uri(mut self, uri: impl Into<String>) -> RequestBuilder<true, M> {
        self.request.uri = uri.into();
        RequestBuilder { request: self.request }
    }
}

impl<const U: bool> RequestBuilder<U, false> {
    /// Sets the request method.
    pub fn method(mut self, method: Method) -> RequestBuilder<U, true> {
        self.request.method = method;
        RequestBuilder { request: self.request }
    }
}

impl<const U: bool, const M: bool> RequestBuilder<U, M> {
    /// Appends a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a raw request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Sets the transfer timeout; zero means the transfer may run
    /// indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = timeout;
        self
    }

    /// Sets POST fields, URL-encoded into `key=value&...` at transfer time.
    pub fn fields(mut self, fields: PostFields) -> Self {
        self.request.fields = fields;
        self
    }

    /// Enables or disables peer verification.
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.request.verify_peer = verify;
        self
    }

    /// Supplies the certificate bundle used for verification.
    pub fn certificate(mut self, certificate: Certificate) -> Self {
        self.request.certificate = Some(certificate);
        self
    }
}

impl RequestBuilder<true, true> {
    /// Finishes the request.
    pub fn build(self) -> Request {
        self.request
    }
}

/// An HTTP client carrying defaults applied to every request.
#[derive(Clone, Debug, Default)]
pub struct Client {
    verify_peer: Option<bool>,
    certificate: Option<Certificate>,
}

/// Builds a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    client: Client,
}

impl ClientBuilder {
    /// Default peer-verification behavior for requests without their own.
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.client.verify_peer = Some(verify);
        self
    }

    /// Default certificate bundle for requests without their own.
    pub fn certificate(mut self, certificate: Certificate) -> Self {
        self.client.certificate = Some(certificate);
        self
    }

    /// Finishes the client.
    pub fn build(self) -> Client {
        self.client
    }
}

impl Client {
    /// Starts building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// A GET of `uri` with the given timeout (zero = unbounded).
    pub fn get(&self, uri: impl Into<String>, timeout: Duration) -> Eventual<(), Response> {
        self.dispatch(Request::builder().uri(uri).method(Method::Get).timeout(timeout).build())
    }

    /// A POST of `fields` to `uri` with the given timeout.
    pub fn post(
        &self,
        uri: impl Into<String>,
        fields: PostFields,
        timeout: Duration,
    ) -> Eventual<(), Response> {
        self.dispatch(
            Request::builder()
                .uri(uri)
                .method(Method::Post)
                .timeout(timeout)
                .fields(fields)
                .build(),
        )
    }

    /// Performs `request` on the default event loop. The composable
    /// re-enters the caller's scheduler context after the transfer settles.
    pub fn dispatch(&self, mut request: Request) -> Eventual<(), Response> {
        if let Some(verify) = self.verify_peer {
            request.verify_peer = verify;
        }
        if request.certificate.is_none() {
            request.certificate = self.certificate.clone();
        }
        reschedule_after(transfer(EventLoop::default_loop(), request))
    }
}

/// A GET of `uri` using a default client.
pub fn get(uri: impl Into<String>, timeout: Duration) -> Eventual<(), Response> {
    Client::default().get(uri, timeout)
}

/// A POST of `fields` to `uri` using a default client.
pub fn post(uri: impl Into<String>, fields: PostFields, timeout: Duration) -> Eventual<(), Response> {
    Client::default().post(uri, fields, timeout)
}

struct Collector(Vec<u8>);

impl Handler for Collector {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }
}

// The easy handle must detach before the multi is cleaned up, so it is
// declared first.
struct Transfer {
    easy: Easy2Handle<Collector>,
    multi: Multi,
}

// curl's handles are raw-pointer FFI types and so not `Send` by default, but
// every access to a `Transfer` happens from inside the loop thread's
// callbacks (it is always taken out of `TransferState`'s mutex, used, and
// put back), never touched concurrently. Crossing the `Arc<TransferShared>`
// boundary into `Callback::new` only requires the compiler's proof that no
// two threads touch it at once, which the mutex already guarantees.
unsafe impl Send for Transfer {}

#[derive(Default)]
struct TransferState {
    // Taken out of the state around every `Multi` call so the socket and
    // timer callbacks may re-lock.
    transfer: Option<Transfer>,
    polls: HashMap<Socket, (mio::Token, Interest)>,
    timer: Option<u64>,
    started: bool,
    interrupted: bool,
}

struct TransferShared {
    loop_: EventLoop,
    resolver: Resolver<Response>,
    state: Mutex<TransferState>,
}

fn transfer(loop_: EventLoop, request: Request) -> Eventual<(), Response> {
    eventual_interruptible(move |resolver: Resolver<Response>, interrupt: Interrupt| {
        let shared = Arc::new(TransferShared {
            loop_: loop_.clone(),
            resolver,
            state: Mutex::new(TransferState::default()),
        });

        {
            let shared = shared.clone();
            interrupt.install(move || {
                let context = shared.loop_.context("http (interrupt)");
                let target = shared.clone();
                shared.loop_.submit(Callback::new(move || abort(&target)), &context);
            });
        }

        let context = loop_.context("http (start)");
        let target = shared.clone();
        loop_.submit(Callback::new(move || start_transfer(&target, request)), &context);
    })
}

// Runs on the loop thread.
fn start_transfer(shared: &Arc<TransferShared>, request: Request) {
    eprintln!("DEBUG start_transfer uri={}", request.uri);
    {
        let mut state = shared.state.lock().unwrap();
        if state.interrupted {
            drop(state);
            shared.resolver.stop();
            return;
        }
        state.started = true;
    }
    match configure(shared, request) {
        Ok(transfer) => {
            shared.state.lock().unwrap().transfer = Some(transfer);
            // Kick the state machine; curl will respond through the timer
            // callback with its first timeout.
            drive_timeout(shared);
        }
        Err(message) => shared.resolver.fail(HttpError(message)),
    }
}

fn configure(shared: &Arc<TransferShared>, request: Request) -> Result<Transfer, String> {
    let mut easy = Easy2::new(Collector(Vec::new()));
    easy.url(&request.uri).map_err(|error| error.to_string())?;
    match request.method {
        Method::Get => easy.get(true).map_err(|error| error.to_string())?,
        Method::Post => {
            easy.post(true).map_err(|error| error.to_string())?;
            let body = if request.fields.is_empty() {
                request.body.clone()
            } else {
                encode_fields(&mut easy, &request.fields).into_bytes()
            };
            easy.post_fields_copy(&body).map_err(|error| error.to_string())?;
        }
    }
    if !request.headers.is_empty() {
        let mut list = List::new();
        for (name, value) in &request.headers {
            list.append(&format!("{name}: {value}")).map_err(|error| error.to_string())?;
        }
        easy.http_headers(list).map_err(|error| error.to_string())?;
    }
    // Zero means the transfer may run indefinitely.
    easy.timeout(request.timeout).map_err(|error| error.to_string())?;
    easy.follow_location(true).map_err(|error| error.to_string())?;
    if !request.verify_peer {
        easy.ssl_verify_peer(false).map_err(|error| error.to_string())?;
    }
    if let Some(certificate) = &request.certificate {
        easy.ssl_cainfo_blob(certificate.pem()).map_err(|error| error.to_string())?;
    }

    let mut multi = Multi::new();

    let weak = Arc::downgrade(shared);
    multi
        .socket_function(move |socket, events, _token| {
            if let Some(shared) = weak.upgrade() {
                on_socket(&shared, socket, events);
            }
        })
        .map_err(|error| error.to_string())?;

    let weak = Arc::downgrade(shared);
    multi
        .timer_function(move |timeout| {
            if let Some(shared) = weak.upgrade() {
                on_timer(&shared, timeout);
            }
            true
        })
        .map_err(|error| error.to_string())?;

    let easy = multi.add2(easy).map_err(|error| error.to_string())?;
    Ok(Transfer { easy, multi })
}

fn encode_fields(easy: &mut Easy2<Collector>, fields: &PostFields) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!("{}={}", easy.url_encode(key.as_bytes()), easy.url_encode(value.as_bytes()))
        })
        .collect::<Vec<_>>()
        .join("&")
}

// curl asks us to watch (or stop watching) one of its sockets.
fn on_socket(shared: &Arc<TransferShared>, socket: Socket, events: SocketEvents) {
    eprintln!("DEBUG on_socket socket={:?} events input={} output={} remove={}", socket, events.input(), events.output(), events.remove());
    let mut state = shared.state.lock().unwrap();
    if events.remove() {
        if let Some((token, _)) = state.polls.remove(&socket) {
            shared.loop_.deregister_fd(token, socket);
        }
        return;
    }

    let mut interest = Interest::READABLE;
    if events.input() && events.output() {
        interest = Interest::READABLE | Interest::WRITABLE;
    } else if events.output() {
        interest = Interest::WRITABLE;
    }

    match state.polls.get(&socket).copied() {
        Some((token, current)) => {
            if current != interest {
                shared.loop_.reregister_fd(token, socket, interest);
                state.polls.insert(socket, (token, interest));
            }
        }
        None => {
            let weak = Arc::downgrade(shared);
            let token = shared.loop_.register_fd(
                socket,
                interest,
                Box::new(move |readiness: Readiness| {
                    if let Some(shared) = weak.upgrade() {
                        drive_socket(&shared, socket, readiness);
                    }
                }),
            );
            state.polls.insert(socket, (token, interest));
        }
    }
}

// curl asks for a (re)armed timeout.
fn on_timer(shared: &Arc<TransferShared>, timeout: Option<Duration>) {
    eprintln!("DEBUG on_timer timeout={:?}", timeout);
    let mut state = shared.state.lock().unwrap();
    if let Some(id) = state.timer.take() {
        shared.loop_.cancel_timer(id);
    }
    if let Some(timeout) = timeout {
        let weak = Arc::downgrade(shared);
        let id = shared.loop_.add_timer(
            timeout,
            Callback::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.state.lock().unwrap().timer = None;
                    drive_timeout(&shared);
                }
            }),
        );
        state.timer = Some(id);
    }
}

fn drive_socket(shared: &Arc<TransferShared>, socket: Socket, readiness: Readiness) {
    eprintln!("DEBUG drive_socket socket={:?} readiness={:?}", socket, readiness);
    let Some(transfer) = shared.state.lock().unwrap().transfer.take() else { return };
    let mut events = Events::new();
    events.input(readiness.readable);
    events.output(readiness.writable);
    events.error(readiness.error);
    let running = transfer.multi.action(socket, &events);
    settle(shared, transfer, running.map_err(|error| error.to_string()));
}

fn drive_timeout(shared: &Arc<TransferShared>) {
    eprintln!("DEBUG drive_timeout");
    let Some(transfer) = shared.state.lock().unwrap().transfer.take() else { return };
    let running = transfer.multi.timeout();
    settle(shared, transfer, running.map_err(|error| error.to_string()));
}

fn settle(shared: &Arc<TransferShared>, transfer: Transfer, running: Result<u32, String>) {
    match running {
        Err(message) => {
            teardown(shared);
            drop(transfer);
            shared.resolver.fail(HttpError(message));
        }
        Ok(0) => complete(shared, transfer),
        Ok(_) => {
            let mut state = shared.state.lock().unwrap();
            if state.interrupted {
                drop(state);
                teardown(shared);
                drop(transfer);
                shared.resolver.stop();
            } else {
                state.transfer = Some(transfer);
            }
        }
    }
}

// No transfers remain running: read the result message and deliver.
fn complete(shared: &Arc<TransferShared>, transfer: Transfer) {
    let mut result: Option<Result<(), curl::Error>> = None;
    let Transfer { easy, multi } = transfer;
    multi.messages(|message| {
        if let Some(outcome) = message.result_for2(&easy) {
            result = Some(outcome);
        }
    });

    teardown(shared);

    match result {
        Some(Ok(())) => match multi.remove2(easy) {
            Ok(mut easy) => {
                let code = easy.response_code().unwrap_or(0);
                let body = std::mem::take(&mut easy.get_mut().0);
                debug!(code, bytes = body.len(), "transfer complete");
                shared.resolver.resolve(Response { code, body });
            }
            Err(error) => shared.resolver.fail(HttpError(error.to_string())),
        },
        Some(Err(error)) => {
            let _ = multi.remove2(easy);
            shared.resolver.fail(HttpError(error.to_string()));
        }
        None => {
            let _ = multi.remove2(easy);
            shared.resolver.fail(HttpError(String::from(
                "transfer finished without a completion message",
            )));
        }
    }
}

// Stops every poll handle and the timer.
fn teardown(shared: &Arc<TransferShared>) {
    let (polls, timer) = {
        let mut state = shared.state.lock().unwrap();
        (std::mem::take(&mut state.polls), state.timer.take())
    };
    for (socket, (token, _)) in polls {
        shared.loop_.deregister_fd(token, socket);
    }
    if let Some(id) = timer {
        shared.loop_.cancel_timer(id);
    }
}

// The interrupt path, on the loop thread: before the transfer starts this
// just stops; mid-transfer it stops the poll handles and the timer, tears
// the transfer down, then stops.
fn abort(shared: &Arc<TransferShared>) {
    let transfer = {
        let mut state = shared.state.lock().unwrap();
        state.interrupted = true;
        if !state.started {
            drop(state);
            shared.resolver.stop();
            return;
        }
        state.transfer.take()
    };
    teardown(shared);
    drop(transfer);
    shared.resolver.stop();
}
