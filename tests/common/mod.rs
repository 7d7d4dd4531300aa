//! Shared test infrastructure for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse, MessageResponseBuilder};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use unifi_names_dns::cache::RecordCache;
use unifi_names_dns::error::DirectoryError;
use unifi_names_dns::handler::UnifiNamesHandler;
use unifi_names_dns::resolver::Resolver;
use unifi_names_dns::records::ClientEntry;
use unifi_names_dns::unifi::{Directory, Fingerprint, UnifiClient};
use unifi_names_dns::zones::ZoneTable;

// --- Constants ---

pub const ZONE: &str = "lan";
pub const SITE: &str = "default";
pub const SESSION_TOKEN: &str = "deadbeef";

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Next handler ---

/// Next stage of the chain: counts calls and answers REFUSED.
#[derive(Clone, Default)]
pub struct RecordingNext {
    calls: Arc<AtomicUsize>,
}

impl RecordingNext {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandler for RecordingNext {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = MessageResponseBuilder::from_message_request(request)
            .error_msg(request.header(), ResponseCode::Refused);
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(_) => {
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

// --- Mock controller ---

/// Client list in the shape returned by `stat/sta`, with the usual noise.
pub fn clients_body(clients: &[(&str, &str, &str)]) -> String {
    let data: Vec<serde_json::Value> = clients
        .iter()
        .map(|(name, network, ip)| {
            serde_json::json!({
                "_id": "eeeeeeeeeeeeeeeeeeeeeeee",
                "_is_guest_by_uap": false,
                "ap_mac": "aa:bb:cc:dd:ee:ff",
                "essid": "PublicWifi",
                "hostname": "debian",
                "ip": ip,
                "is_wired": false,
                "mac": "aa:bb:cc:dd:ee:ff",
                "name": name,
                "network": network,
                "network_id": "eeeeeeeeeeeeeeeeeeeeeeee",
                "rssi": 40,
                "uptime": 83485,
            })
        })
        .collect();
    serde_json::json!({ "data": data, "meta": { "rc": "ok" } }).to_string()
}

struct MockState {
    login_status: AtomicU16,
    logout_status: AtomicU16,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    clients: Mutex<String>,
    session: Mutex<String>,
    referer: Mutex<Option<String>>,
}

impl MockState {
    fn respond(&self, req: hyper::Request<Incoming>) -> hyper::Response<Full<Bytes>> {
        let reply = |status: u16, body: String| {
            hyper::Response::builder()
                .status(StatusCode::from_u16(status).unwrap())
                .body(Full::new(Bytes::from(body)))
                .unwrap()
        };

        if req.method() != Method::POST {
            return reply(405, String::new());
        }

        match req.uri().path() {
            "/api/login" => {
                self.logins.fetch_add(1, Ordering::SeqCst);
                *self.referer.lock().unwrap() = req
                    .headers()
                    .get(hyper::header::REFERER)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let status = self.login_status.load(Ordering::SeqCst);
                let mut response = reply(status, String::new());
                if status == 200 {
                    response.headers_mut().insert(
                        hyper::header::SET_COOKIE,
                        format!("unifises={}; Path=/", self.session.lock().unwrap())
                            .parse()
                            .unwrap(),
                    );
                }
                response
            }
            path if path == format!("/api/s/{SITE}/stat/sta") => {
                reply(200, self.clients.lock().unwrap().clone())
            }
            "/logout" => {
                self.logouts.fetch_add(1, Ordering::SeqCst);
                reply(self.logout_status.load(Ordering::SeqCst), String::new())
            }
            _ => reply(404, String::new()),
        }
    }
}

/// In-process HTTPS UniFi controller with a self-signed certificate.
pub struct MockController {
    pub url: String,
    /// SHA-1 fingerprint of the served certificate.
    pub fingerprint: Fingerprint,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockController {
    pub async fn start(clients: &[(&str, &str, &str)]) -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let fingerprint = Fingerprint::of_certificate(cert.der());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let tls = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(tls));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            login_status: AtomicU16::new(200),
            logout_status: AtomicU16::new(200),
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            clients: Mutex::new(clients_body(clients)),
            session: Mutex::new(SESSION_TOKEN.to_string()),
            referer: Mutex::new(None),
        });

        let task = tokio::spawn({
            let state = state.clone();
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let acceptor = acceptor.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        let Ok(stream) = acceptor.accept(stream).await else {
                            return;
                        };
                        let service = service_fn(move |req| {
                            let response = state.respond(req);
                            async move { Ok::<_, Infallible>(response) }
                        });
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
            }
        });

        Self {
            url: format!("https://127.0.0.1:{}", addr.port()),
            fingerprint,
            state,
            task,
        }
    }

    pub fn set_login_status(&self, status: u16) {
        self.state.login_status.store(status, Ordering::SeqCst);
    }

    pub fn set_logout_status(&self, status: u16) {
        self.state.logout_status.store(status, Ordering::SeqCst);
    }

    pub fn set_clients_body(&self, body: impl Into<String>) {
        *self.state.clients.lock().unwrap() = body.into();
    }

    pub fn set_session_cookie(&self, value: &str) {
        *self.state.session.lock().unwrap() = value.to_string();
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }

    pub fn last_referer(&self) -> Option<String> {
        self.state.referer.lock().unwrap().clone()
    }

    pub fn client(&self, pin: Option<Fingerprint>) -> UnifiClient {
        UnifiClient::new(self.url.clone(), SITE, "admin", "admin", pin).unwrap()
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Directory that starts with a correctly pinned client and can be switched
/// to one pinned to a different certificate.
pub struct SwitchablePin {
    trusted: UnifiClient,
    mismatched: UnifiClient,
    use_mismatched: AtomicBool,
}

impl SwitchablePin {
    pub fn new(controller: &MockController) -> Self {
        Self {
            trusted: controller.client(Some(controller.fingerprint)),
            mismatched: controller.client(Some(Fingerprint::from([0u8; 20]))),
            use_mismatched: AtomicBool::new(false),
        }
    }

    pub fn switch_to_mismatched(&self) {
        self.use_mismatched.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for SwitchablePin {
    async fn fetch_clients(&self) -> Result<Vec<ClientEntry>, DirectoryError> {
        if self.use_mismatched.load(Ordering::SeqCst) {
            self.mismatched.fetch_clients().await
        } else {
            self.trusted.fetch_clients().await
        }
    }
}

// --- Handler construction ---

pub fn test_zones() -> Arc<ZoneTable> {
    Arc::new(ZoneTable::new([(ZONE, "lan")]).unwrap())
}

/// Build the handler chain against a controller, returning the next stage
/// for call counting.
pub fn build_handler(
    client: UnifiClient,
    ttl: Duration,
) -> (UnifiNamesHandler<RecordingNext>, RecordingNext) {
    build_handler_with(Arc::new(client), ttl)
}

/// Build the handler chain over any directory.
pub fn build_handler_with(
    directory: Arc<dyn Directory>,
    ttl: Duration,
) -> (UnifiNamesHandler<RecordingNext>, RecordingNext) {
    let zones = test_zones();
    let cache = Arc::new(RecordCache::new(directory, zones.clone(), ttl));
    let next = RecordingNext::default();
    let handler = UnifiNamesHandler::new(Resolver::new(zones, cache), next.clone());
    (handler, next)
}

// --- Query/Request construction ---

fn src() -> SocketAddr {
    "10.0.0.1:12345".parse().unwrap()
}

/// Build wire-format bytes for a DNS query with the given questions.
pub fn build_query_bytes(questions: &[(&str, RecordType, DNSClass)], id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    for (name, record_type, class) in questions {
        let mut query = Query::new();
        query.set_name(Name::from_ascii(name).unwrap());
        query.set_query_type(*record_type);
        query.set_query_class(*class);
        msg.add_query(query);
    }
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from questions.
pub fn build_request(questions: &[(&str, RecordType, DNSClass)], id: u16) -> Request {
    let bytes = build_query_bytes(questions, id);
    let msg = parse_message_request(&bytes);
    Request::new(msg, src(), Protocol::Udp)
}

// --- Response helpers ---

/// Run a request through `handler` and return the parsed response.
pub async fn execute<H: RequestHandler>(
    handler: &H,
    questions: &[(&str, RecordType, DNSClass)],
    id: u16,
) -> Message {
    let request = build_request(questions, id);
    let response = TestResponseHandler::new();
    handler.handle_request(&request, response.clone()).await;
    response.into_message()
}

/// Single IN-class question.
pub async fn execute_query<H: RequestHandler>(
    handler: &H,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    execute(handler, &[(name, record_type, DNSClass::IN)], id).await
}

/// Extract the address of every A/AAAA answer.
pub fn answer_ips(msg: &Message) -> Vec<std::net::IpAddr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(std::net::IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(std::net::IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
