//! Scripted in-process FTP server for integration tests.
//!
//! Keeps an in-memory file tree shared by all connections, records every
//! command it receives, and flags any command that arrived while a previous
//! one was still unanswered.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rax_ftp_client::ClientConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

pub const USER: &str = "alice";
pub const PASSWORD: &str = "secret";

const CERT_DER: &[u8] = include_bytes!("../data/server-cert.der");
const KEY_DER: &[u8] = include_bytes!("../data/server-key.der");

/// Control or data connection, plain or TLS.
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Wire = Box<dyn Io>;
type Writer = WriteHalf<Wire>;

fn tls_acceptor() -> TlsAcceptor {
    let cert = CertificateDer::from(CERT_DER.to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(KEY_DER.to_vec()));
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// 230 straight after USER
    Direct,
    /// 331 then 230
    Password,
    /// 331, 332, then 230 after ACCT
    PasswordAndAccount,
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub login: LoginFlow,
    /// Final reply code sent after a RETR payload
    pub retr_final_code: u16,
    pub chmod_supported: bool,
    pub size_supported: bool,
    pub epsv_supported: bool,
    /// Send `120` before the `220` greeting
    pub slow_greeting: bool,
    pub pwd_delay: Option<Duration>,
    /// Answer this verb with 421 and hang up
    pub unavailable_on: Option<&'static str>,
    /// Accept `AUTH TLS` with the bundled self-signed certificate
    pub tls: bool,
    /// Accept `PBSZ 0` and `PROT P`
    pub prot_supported: bool,
    pub type_supported: bool,
    /// A directory CWD enters only once; later attempts get 550
    pub cwd_once: Option<&'static str>,
    /// Answer RETR/LIST with 150 but never open the data connection
    pub skip_data_connect: bool,
    /// Send the first bytes of a RETR payload, then hold the data connection
    /// open without sending more
    pub stall_data: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        MockOptions {
            login: LoginFlow::Password,
            retr_final_code: 226,
            chmod_supported: true,
            size_supported: true,
            epsv_supported: true,
            slow_greeting: false,
            pwd_delay: None,
            unavailable_on: None,
            tls: false,
            prot_supported: true,
            type_supported: true,
            cwd_once: None,
            skip_data_connect: false,
            stall_data: false,
        }
    }
}

#[derive(Default)]
struct Shared {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    log: Vec<String>,
    quits: usize,
    pipelined: bool,
    connections: usize,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
}

impl MockServer {
    pub async fn start(options: MockOptions) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        shared.lock().unwrap().dirs.insert("/".to_string());

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.lock().unwrap().connections += 1;
                let mut conn = Connection::new(accept_shared.clone(), options.clone());
                if options.tls {
                    conn.acceptor = Some(tls_acceptor());
                }
                tokio::spawn(conn.serve(stream));
            }
        });

        MockServer { addr, shared }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Client configuration for this server with short timeouts.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.address(), USER, PASSWORD);
        config.connection.connect_timeout_secs = 5;
        config.connection.reply_timeout_secs = 5;
        config.transfer.data_timeout_secs = 5;
        config.transfer.idle_timeout_secs = 5;
        config.transfer.buffer_size = 7;
        config
    }

    pub fn add_dir(&self, path: &str) {
        self.shared.lock().unwrap().dirs.insert(path.to_string());
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.shared
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.shared.lock().unwrap().dirs.contains(path)
    }

    /// Every command received so far, as sent.
    pub fn commands(&self) -> Vec<String> {
        self.shared.lock().unwrap().log.clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.verbs().iter().filter(|v| v.as_str() == verb).count()
    }

    pub fn clear_log(&self) {
        self.shared.lock().unwrap().log.clear();
    }

    pub fn quit_count(&self) -> usize {
        self.shared.lock().unwrap().quits
    }

    pub fn pipelined(&self) -> bool {
        self.shared.lock().unwrap().pipelined
    }

    pub fn connections(&self) -> usize {
        self.shared.lock().unwrap().connections
    }
}

enum DataSetup {
    Passive(TcpListener),
    Active(SocketAddr),
}

struct Connection {
    shared: Arc<Mutex<Shared>>,
    options: MockOptions,
    cwd: String,
    logged_in: bool,
    ascii: bool,
    rename_from: Option<String>,
    data: Option<DataSetup>,
    acceptor: Option<TlsAcceptor>,
    /// PROT P accepted
    protected: bool,
    entered: BTreeSet<String>,
}

fn normalize(cwd: &str, arg: &str) -> String {
    let mut parts: Vec<&str> = if arg.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|p| !p.is_empty()).collect()
    };
    for part in arg.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((p, _)) => p.to_string(),
    }
}

fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

async fn reply(w: &mut Writer, code: u16, text: &str) {
    w.write_all(format!("{code} {text}\r\n").as_bytes())
        .await
        .unwrap();
}

async fn raw(w: &mut Writer, text: &str) {
    w.write_all(text.as_bytes()).await.unwrap();
}

impl Connection {
    fn new(shared: Arc<Mutex<Shared>>, options: MockOptions) -> Self {
        Connection {
            shared,
            options,
            cwd: "/".to_string(),
            logged_in: false,
            ascii: true,
            rename_from: None,
            data: None,
            acceptor: None,
            protected: false,
            entered: BTreeSet::new(),
        }
    }

    async fn serve(mut self, stream: TcpStream) {
        let (rd, mut w) = tokio::io::split(Box::new(stream) as Wire);
        let mut reader = BufReader::new(rd);

        if self.options.slow_greeting {
            reply(&mut w, 120, "Service ready in a moment").await;
        }
        reply(&mut w, 220, "Mock FTP ready").await;

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let command = line.trim_end_matches(['\r', '\n']).to_string();
            {
                let mut shared = self.shared.lock().unwrap();
                if !reader.buffer().is_empty() {
                    shared.pipelined = true;
                }
                shared.log.push(command.clone());
            }

            let (verb, arg) = match command.split_once(' ') {
                Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
                None => (command.to_ascii_uppercase(), String::new()),
            };

            if self.options.unavailable_on == Some(verb.as_str()) {
                reply(&mut w, 421, "Service shutting down").await;
                return;
            }

            if verb == "AUTH" {
                let Some(acceptor) = self.acceptor.clone() else {
                    reply(&mut w, 502, "AUTH not supported").await;
                    continue;
                };
                if !arg.eq_ignore_ascii_case("TLS") {
                    reply(&mut w, 504, "Unsupported security mechanism").await;
                    continue;
                }
                reply(&mut w, 234, "Proceed with negotiation").await;
                let plain = reader.into_inner().unsplit(w);
                let Ok(secured) = acceptor.accept(plain).await else {
                    return;
                };
                let (rd, secured_w) = tokio::io::split(Box::new(secured) as Wire);
                reader = BufReader::new(rd);
                w = secured_w;
                continue;
            }

            if verb == "QUIT" {
                self.shared.lock().unwrap().quits += 1;
                reply(&mut w, 221, "Goodbye").await;
                return;
            }

            self.handle(&verb, &arg, &mut w).await;
        }
    }

    async fn handle(&mut self, verb: &str, arg: &str, w: &mut Writer) {
        let open = matches!(verb, "USER" | "PASS" | "ACCT" | "FEAT" | "NOOP");
        if !self.logged_in && !open {
            return reply(w, 530, "Please login with USER and PASS").await;
        }

        match verb {
            "USER" => match self.options.login {
                LoginFlow::Direct => {
                    self.logged_in = true;
                    reply(w, 230, "Login successful").await
                }
                _ => reply(w, 331, "Password required").await,
            },
            "PASS" if arg != PASSWORD => reply(w, 530, "Login incorrect").await,
            "PASS" => match self.options.login {
                LoginFlow::PasswordAndAccount => reply(w, 332, "Account required").await,
                _ => {
                    self.logged_in = true;
                    reply(w, 230, "Login successful").await
                }
            },
            "ACCT" => {
                self.logged_in = true;
                reply(w, 230, "Login successful").await
            }
            "NOOP" => reply(w, 200, "OK").await,
            "FEAT" => {
                raw(
                    w,
                    "211-Features:\r\n SIZE\r\n MLST type*;size*;\r\n EPSV\r\n UTF8\r\n211 End\r\n",
                )
                .await
            }
            "PWD" => {
                if let Some(delay) = self.options.pwd_delay {
                    tokio::time::sleep(delay).await;
                }
                let quoted = self.cwd.replace('"', "\"\"");
                reply(w, 257, &format!("\"{quoted}\" is the current directory")).await
            }
            "CWD" => {
                let target = normalize(&self.cwd, arg);
                let locked = self.options.cwd_once == Some(target.as_str())
                    && !self.entered.insert(target.clone());
                if !locked && self.shared.lock().unwrap().dirs.contains(&target) {
                    self.cwd = target;
                    reply(w, 250, "Directory changed").await
                } else {
                    reply(w, 550, "No such directory").await
                }
            }
            "CDUP" => {
                self.cwd = parent(&self.cwd);
                reply(w, 250, "Directory changed").await
            }
            "MKD" => {
                let target = normalize(&self.cwd, arg);
                let outcome = {
                    let mut s = self.shared.lock().unwrap();
                    if s.dirs.contains(&target) || s.files.contains_key(&target) {
                        Err("Directory already exists")
                    } else if !s.dirs.contains(&parent(&target)) {
                        Err("No such file or directory")
                    } else {
                        s.dirs.insert(target.clone());
                        Ok(())
                    }
                };
                match outcome {
                    Ok(()) => reply(w, 257, &format!("\"{target}\" created")).await,
                    Err(text) => reply(w, 550, text).await,
                }
            }
            "RMD" => {
                let target = normalize(&self.cwd, arg);
                let outcome = {
                    let mut s = self.shared.lock().unwrap();
                    let busy = s.files.keys().any(|f| parent(f) == target)
                        || s.dirs.iter().any(|d| d != &target && parent(d) == target);
                    if !s.dirs.contains(&target) {
                        Err("No such directory")
                    } else if busy {
                        Err("Directory not empty")
                    } else {
                        s.dirs.remove(&target);
                        Ok(())
                    }
                };
                match outcome {
                    Ok(()) => reply(w, 250, "Directory removed").await,
                    Err(text) => reply(w, 550, text).await,
                }
            }
            "DELE" => {
                let target = normalize(&self.cwd, arg);
                let removed = self.shared.lock().unwrap().files.remove(&target).is_some();
                if removed {
                    reply(w, 250, "File deleted").await
                } else {
                    reply(w, 550, "No such file").await
                }
            }
            "RNFR" => {
                let target = normalize(&self.cwd, arg);
                let exists = {
                    let s = self.shared.lock().unwrap();
                    s.files.contains_key(&target) || s.dirs.contains(&target)
                };
                if exists {
                    self.rename_from = Some(target);
                    reply(w, 350, "Ready for RNTO").await
                } else {
                    reply(w, 550, "No such file or directory").await
                }
            }
            "RNTO" => {
                let Some(from) = self.rename_from.take() else {
                    return reply(w, 503, "Bad sequence of commands").await;
                };
                let to = normalize(&self.cwd, arg);
                self.rename(&from, &to);
                reply(w, 250, "Rename successful").await
            }
            "SITE" => {
                let mut words = arg.splitn(3, ' ');
                let sub = words.next().unwrap_or_default().to_ascii_uppercase();
                let mode = words.next().unwrap_or_default();
                let path = words.next().unwrap_or_default();
                if sub != "CHMOD" || !self.options.chmod_supported {
                    return reply(w, 502, "SITE command not implemented").await;
                }
                if u32::from_str_radix(mode, 8).is_err() {
                    return reply(w, 501, "Invalid mode").await;
                }
                let target = normalize(&self.cwd, path);
                let exists = {
                    let s = self.shared.lock().unwrap();
                    s.files.contains_key(&target) || s.dirs.contains(&target)
                };
                if exists {
                    reply(w, 200, "SITE CHMOD command ok").await
                } else {
                    reply(w, 550, "No such file or directory").await
                }
            }
            "SIZE" => {
                if !self.options.size_supported {
                    return reply(w, 502, "SIZE not implemented").await;
                }
                if self.ascii {
                    return reply(w, 550, "SIZE not allowed in ASCII mode").await;
                }
                let target = normalize(&self.cwd, arg);
                let size = self.shared.lock().unwrap().files.get(&target).map(Vec::len);
                match size {
                    Some(n) => reply(w, 213, &n.to_string()).await,
                    None => reply(w, 550, "Could not get file size").await,
                }
            }
            "MLST" => {
                let target = normalize(&self.cwd, arg);
                let fact = {
                    let s = self.shared.lock().unwrap();
                    if let Some(data) = s.files.get(&target) {
                        Some(format!("type=file;size={};", data.len()))
                    } else if s.dirs.contains(&target) {
                        Some("type=dir;".to_string())
                    } else {
                        None
                    }
                };
                match fact {
                    Some(fact) => {
                        raw(
                            w,
                            &format!("250-Listing {target}\r\n {fact} {target}\r\n250 End\r\n"),
                        )
                        .await
                    }
                    None => reply(w, 550, "No such file or directory").await,
                }
            }
            "PBSZ" if self.options.prot_supported => reply(w, 200, "PBSZ=0").await,
            "PROT" if self.options.prot_supported && arg.eq_ignore_ascii_case("P") => {
                self.protected = true;
                reply(w, 200, "Protection level set to P").await
            }
            "PBSZ" | "PROT" => reply(w, 502, "Data protection not implemented").await,
            "TYPE" if !self.options.type_supported => reply(w, 502, "TYPE not implemented").await,
            "TYPE" => match arg.to_ascii_uppercase().as_str() {
                "A" => {
                    self.ascii = true;
                    reply(w, 200, "Switching to ASCII mode").await
                }
                "I" => {
                    self.ascii = false;
                    reply(w, 200, "Switching to Binary mode").await
                }
                _ => reply(w, 504, "Unsupported type").await,
            },
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                self.data = Some(DataSetup::Passive(listener));
                // announce an unroutable host; clients should use the control peer
                let text = format!(
                    "Entering Passive Mode (10,0,0,1,{},{})",
                    port >> 8,
                    port & 0xff
                );
                reply(w, 227, &text).await
            }
            "EPSV" => {
                if !self.options.epsv_supported {
                    return reply(w, 502, "EPSV not implemented").await;
                }
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                self.data = Some(DataSetup::Passive(listener));
                reply(w, 229, &format!("Entering Extended Passive Mode (|||{port}|)")).await
            }
            "PORT" => {
                let nums: Vec<u16> = arg.split(',').filter_map(|n| n.parse().ok()).collect();
                if nums.len() != 6 {
                    return reply(w, 501, "Bad PORT argument").await;
                }
                let ip = Ipv4Addr::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8);
                let port = nums[4] * 256 + nums[5];
                self.data = Some(DataSetup::Active(SocketAddr::new(IpAddr::V4(ip), port)));
                reply(w, 200, "PORT command successful").await
            }
            "EPRT" => {
                let fields: Vec<&str> = arg.split('|').collect();
                let parsed = match fields.as_slice() {
                    ["", _, host, port, ""] => host
                        .parse::<IpAddr>()
                        .ok()
                        .zip(port.parse::<u16>().ok())
                        .map(|(ip, port)| SocketAddr::new(ip, port)),
                    _ => None,
                };
                match parsed {
                    Some(addr) => {
                        self.data = Some(DataSetup::Active(addr));
                        reply(w, 200, "EPRT command successful").await
                    }
                    None => reply(w, 501, "Bad EPRT argument").await,
                }
            }
            "RETR" => {
                let target = normalize(&self.cwd, arg);
                let content = self.shared.lock().unwrap().files.get(&target).cloned();
                let Some(mut content) = content else {
                    self.data = None;
                    return reply(w, 550, "No such file or directory").await;
                };
                if self.ascii {
                    content = to_network_text(&content);
                }
                self.send_data(w, &content, self.options.retr_final_code).await
            }
            "STOR" => {
                let target = normalize(&self.cwd, arg);
                if !self.shared.lock().unwrap().dirs.contains(&parent(&target)) {
                    self.data = None;
                    return reply(w, 553, "Could not create file").await;
                }
                let Some(setup) = self.data.take() else {
                    return reply(w, 425, "Use PORT or PASV first").await;
                };
                reply(w, 150, "Ok to send data").await;
                let mut stream = self.open_data(setup).await;
                let mut content = Vec::new();
                stream.read_to_end(&mut content).await.unwrap();
                if self.ascii {
                    content = from_network_text(&content);
                }
                self.shared.lock().unwrap().files.insert(target, content);
                reply(w, 226, "Transfer complete").await
            }
            "LIST" | "NLST" => {
                let target = if arg.is_empty() {
                    self.cwd.clone()
                } else {
                    normalize(&self.cwd, arg)
                };
                let listing = {
                    let s = self.shared.lock().unwrap();
                    if !s.dirs.contains(&target) {
                        None
                    } else {
                        let mut lines = Vec::new();
                        for d in s.dirs.iter().filter(|d| *d != &target && parent(d) == target) {
                            lines.push(if verb == "LIST" {
                                format!("drwxr-xr-x 1 ftp ftp 0 Jan 01 00:00 {}", name(d))
                            } else {
                                name(d).to_string()
                            });
                        }
                        for (f, data) in s.files.iter().filter(|(f, _)| parent(f) == target) {
                            lines.push(if verb == "LIST" {
                                format!("-rw-r--r-- 1 ftp ftp {} Jan 01 00:00 {}", data.len(), name(f))
                            } else {
                                name(f).to_string()
                            });
                        }
                        Some(lines)
                    }
                };
                let Some(lines) = listing else {
                    self.data = None;
                    return reply(w, 550, "No such directory").await;
                };
                let mut body = String::new();
                for l in lines {
                    body.push_str(&l);
                    body.push_str("\r\n");
                }
                self.send_data(w, body.as_bytes(), 226).await
            }
            _ => reply(w, 502, "Command not implemented").await,
        }
    }

    async fn send_data(&mut self, w: &mut Writer, content: &[u8], final_code: u16) {
        let Some(setup) = self.data.take() else {
            return reply(w, 425, "Use PORT or PASV first").await;
        };
        reply(w, 150, "Opening data connection").await;
        if self.options.skip_data_connect {
            return;
        }
        let mut stream = self.open_data(setup).await;
        if self.options.stall_data {
            let head = &content[..content.len().min(4)];
            stream.write_all(head).await.unwrap();
            stream.flush().await.unwrap();
            std::future::pending::<()>().await;
        }
        stream.write_all(content).await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);
        let text = if final_code == 226 {
            "Transfer complete"
        } else {
            "Transfer failed"
        };
        reply(w, final_code, text).await
    }

    fn rename(&mut self, from: &str, to: &str) {
        let mut s = self.shared.lock().unwrap();
        if let Some(data) = s.files.remove(from) {
            s.files.insert(to.to_string(), data);
            return;
        }
        let dirs: Vec<String> = s.dirs.iter().filter(|d| under(d, from)).cloned().collect();
        for d in dirs {
            s.dirs.remove(&d);
            s.dirs.insert(format!("{to}{}", &d[from.len()..]));
        }
        let files: Vec<String> = s.files.keys().filter(|f| under(f, from)).cloned().collect();
        for f in files {
            if let Some(data) = s.files.remove(&f) {
                s.files.insert(format!("{to}{}", &f[from.len()..]), data);
            }
        }
    }
}

impl Connection {
    /// Completes the data connection, TLS-wrapped after PROT P.
    async fn open_data(&self, setup: DataSetup) -> Wire {
        let connect = async {
            match setup {
                DataSetup::Passive(listener) => listener.accept().await.map(|(s, _)| s),
                DataSetup::Active(addr) => TcpStream::connect(addr).await,
            }
        };
        let tcp = tokio::time::timeout(Duration::from_secs(5), connect)
            .await
            .expect("data connection timed out")
            .expect("data connection failed");
        match (&self.acceptor, self.protected) {
            (Some(acceptor), true) => Box::new(
                acceptor
                    .accept(tcp)
                    .await
                    .expect("data channel TLS handshake failed"),
            ),
            _ => Box::new(tcp),
        }
    }
}

fn to_network_text(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    for &b in content {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}

fn from_network_text(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut i = 0;
    while i < content.len() {
        if content[i] == b'\r' && content.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        out.push(content[i]);
        i += 1;
    }
    out
}
