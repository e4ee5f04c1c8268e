//! End-to-end tests driving a real daemon over loopback sockets.
//!
//! Each test binds its own ephemeral port, runs the accept loop on a
//! background thread, and scripts a raw `TcpStream` client against
//! it, asserting on the literal control-channel bytes.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use daemon::{password_digest, run_daemon, AddrFamilyArg, DaemonConfig, LogLevelArg};
use tempfile::TempDir;

fn allocate_test_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("probe bind");
    let port = listener.local_addr().expect("probe addr").port();
    drop(listener);
    port
}

fn test_config(root: &Path, port: u16) -> DaemonConfig {
    DaemonConfig {
        port,
        family: AddrFamilyArg::Ipv4,
        root: root.to_path_buf(),
        log_level: LogLevelArg::Error,
        max_connections: Some(16),
        users_file: root.join("users.db"),
        anonymous_enabled: true,
        anonymous_home: String::from("/pub"),
        idle_timeout: Duration::from_secs(30),
    }
}

/// Writes a users.db with a full-permission account and a confined one.
fn seed_users(root: &Path) {
    let records = format!(
        "# test accounts\n\
         alice:{}:/:0x3f\n\
         bob:{}:/home/bob:0x3f\n",
        password_digest("secret"),
        password_digest("hunter2"),
    );
    fs::write(root.join("users.db"), records).expect("write users.db");
}

fn spawn_daemon(config: DaemonConfig) {
    thread::spawn(move || {
        let _ = run_daemon(config);
    });
}

fn connect_with_retries(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)) {
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .expect("read timeout");
            stream
                .set_write_timeout(Some(Duration::from_secs(10)))
                .expect("write timeout");
            return stream;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("daemon did not start listening on port {port}");
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(port: u16) -> Self {
        let stream = connect_with_retries(port);
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self {
            reader,
            writer: stream,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .expect("send command");
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).expect("read reply");
        assert!(n > 0, "server closed the control connection unexpectedly");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Reads one reply line and asserts its three-digit code.
    fn expect(&mut self, code: u16) -> String {
        let line = self.read_line();
        assert!(
            line.starts_with(&format!("{code} ")),
            "expected {code}, got: {line}"
        );
        line
    }

    /// Reads a multi-line reply through its final `CODE SP` line.
    fn expect_block(&mut self, code: u16) -> Vec<String> {
        let mut lines = Vec::new();
        let terminator = format!("{code} ");
        loop {
            let line = self.read_line();
            let done = line.starts_with(&terminator);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    fn login(&mut self, user: &str, password: &str) {
        self.send(&format!("USER {user}"));
        self.expect(331);
        self.send(&format!("PASS {password}"));
        self.expect(230);
    }

    /// Issues PASV and connects to the advertised endpoint.
    fn open_passive(&mut self) -> TcpStream {
        self.send("PASV");
        let line = self.expect(227);
        let open = line.find('(').expect("PASV open paren");
        let close = line.find(')').expect("PASV close paren");
        let fields: Vec<u16> = line[open + 1..close]
            .split(',')
            .map(|f| f.trim().parse().expect("PASV field"))
            .collect();
        assert_eq!(fields.len(), 6, "PASV reply: {line}");
        let addr = format!(
            "{}.{}.{}.{}:{}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            fields[4] * 256 + fields[5]
        );
        TcpStream::connect(addr).expect("connect data channel")
    }

    fn eof(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.reader.read(&mut byte), Ok(0))
    }
}

fn read_to_end(mut stream: TcpStream) -> Vec<u8> {
    let mut payload = Vec::new();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("data timeout");
    stream.read_to_end(&mut payload).expect("read data channel");
    payload
}

struct Fixture {
    _root: TempDir,
    root_path: PathBuf,
    port: u16,
}

fn start_server(seed_accounts: bool) -> Fixture {
    let root = TempDir::new().expect("tempdir");
    let root_path = root.path().to_path_buf();
    if seed_accounts {
        seed_users(&root_path);
        fs::create_dir_all(root_path.join("home/bob")).expect("bob home");
    }
    let port = allocate_test_port();
    spawn_daemon(test_config(&root_path, port));
    Fixture {
        _root: root,
        root_path,
        port,
    }
}

#[test]
fn handshake_and_anonymous_login() {
    let server = start_server(false);
    let mut client = Client::connect(server.port);

    assert_eq!(client.read_line(), "220 FTP Server Ready");
    client.send("USER anonymous");
    assert_eq!(
        client.read_line(),
        "331 Anonymous login OK, send your email as password"
    );
    client.send("PASS user@example.com");
    assert_eq!(client.read_line(), "230 User logged in, proceed");
    client.send("PWD");
    assert_eq!(client.read_line(), "257 \"/pub\" is current directory");

    client.send("QUIT");
    let block = client.expect_block(221);
    assert!(block.len() > 1, "expected statistics lines: {block:?}");
    assert_eq!(block.last().expect("final line"), "221 Closing connection");
    assert!(client.eof());
}

#[test]
fn binary_retr_with_restart_offset() {
    let server = start_server(false);
    fs::write(
        server.root_path.join("pub/a.bin"),
        (0u8..10).collect::<Vec<u8>>(),
    )
    .expect("seed a.bin");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    client.send("TYPE I");
    client.expect(200);
    let data = client.open_passive();
    client.send("REST 3");
    client.expect(350);
    client.send("RETR a.bin");
    client.expect(150);

    assert_eq!(read_to_end(data), vec![3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(client.read_line(), "226 Transfer complete");
}

#[test]
fn concurrent_store_and_retrieve_conflict() {
    let server = start_server(true);

    let mut writer = Client::connect(server.port);
    writer.expect(220);
    writer.login("alice", "secret");
    writer.send("TYPE I");
    writer.expect(200);
    let mut upload = writer.open_passive();
    writer.send("STOR foo");
    writer.expect(150);
    upload.write_all(b"payload").expect("upload bytes");

    // The upload worker now holds the exclusive lock on foo.
    thread::sleep(Duration::from_millis(200));

    let mut reader = Client::connect(server.port);
    reader.expect(220);
    reader.login("alice", "secret");
    reader.send("TYPE I");
    reader.expect(200);
    let _stale = reader.open_passive();
    reader.send("RETR foo");
    assert_eq!(
        reader.read_line(),
        "450 File is currently being written to, please try again later"
    );

    drop(upload);
    assert_eq!(writer.read_line(), "226 Transfer complete");

    let data = reader.open_passive();
    reader.send("RETR foo");
    reader.expect(150);
    assert_eq!(read_to_end(data), b"payload");
    reader.expect(226);
}

#[test]
fn abort_during_retrieve() {
    let server = start_server(false);
    fs::write(
        server.root_path.join("pub/big.bin"),
        vec![0xa5u8; 32 * 1024 * 1024],
    )
    .expect("seed big.bin");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");
    client.send("TYPE I");
    client.expect(200);

    let mut data = client.open_passive();
    client.send("RETR big.bin");
    client.expect(150);

    // Pull a little so the transfer is demonstrably underway, then
    // leave the rest unread; backpressure parks the worker in send.
    let mut first = [0u8; 4096];
    data.set_read_timeout(Some(Duration::from_secs(10)))
        .expect("data timeout");
    data.read_exact(&mut first).expect("first chunk");

    client.send("ABOR");
    let first_reply = client.read_line();
    assert!(
        first_reply.starts_with("426 "),
        "expected 426, got: {first_reply}"
    );
    assert_eq!(client.read_line(), "226 ABOR command successful");
}

#[test]
fn sandbox_rejects_traversal() {
    let server = start_server(true);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("bob", "hunter2");

    client.send("PWD");
    assert_eq!(client.read_line(), "257 \"/home/bob\" is current directory");

    client.send("CWD /etc");
    assert_eq!(client.read_line(), "550 Failed to change directory");

    client.send("RETR ../../../etc/passwd");
    assert_eq!(client.read_line(), "550 Permission denied");
}

#[test]
fn rename_sequence_is_broken_by_interleaved_command() {
    let server = start_server(true);
    fs::write(server.root_path.join("home/bob/a.txt"), b"rename me").expect("seed a.txt");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("bob", "hunter2");

    client.send("RNFR a.txt");
    client.expect(350);
    client.send("PWD");
    client.expect(257);
    client.send("RNTO b.txt");
    assert_eq!(
        client.read_line(),
        "503 Bad sequence of commands (use RNFR first)"
    );

    client.send("RNFR a.txt");
    client.expect(350);
    client.send("RNTO b.txt");
    client.expect(250);

    assert!(!server.root_path.join("home/bob/a.txt").exists());
    assert_eq!(
        fs::read(server.root_path.join("home/bob/b.txt")).expect("renamed file"),
        b"rename me"
    );
}

#[test]
fn store_with_restart_offset_preserves_prefix() {
    let server = start_server(true);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("alice", "secret");
    client.send("TYPE I");
    client.expect(200);

    let mut data = client.open_passive();
    client.send("STOR patch.bin");
    client.expect(150);
    data.write_all(b"AAAAAAAAAA").expect("initial upload");
    drop(data);
    client.expect(226);

    let mut data = client.open_passive();
    client.send("REST 4");
    client.expect(350);
    client.send("STOR patch.bin");
    client.expect(150);
    data.write_all(b"BB").expect("patch upload");
    drop(data);
    client.expect(226);

    assert_eq!(
        fs::read(server.root_path.join("patch.bin")).expect("patched file"),
        b"AAAABB"
    );
}

#[cfg(unix)]
#[test]
fn ascii_type_translates_newlines() {
    let server = start_server(true);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("alice", "secret");
    client.send("TYPE A");
    client.expect(200);

    let mut data = client.open_passive();
    client.send("STOR notes.txt");
    client.expect(150);
    data.write_all(b"one\r\ntwo\r\n").expect("upload text");
    drop(data);
    client.expect(226);

    // CRLF collapsed to LF on disk.
    assert_eq!(
        fs::read(server.root_path.join("notes.txt")).expect("stored text"),
        b"one\ntwo\n"
    );

    // And expanded back to CRLF on the way out.
    let data = client.open_passive();
    client.send("RETR notes.txt");
    client.expect(150);
    assert_eq!(read_to_end(data), b"one\r\ntwo\r\n");
    client.expect(226);
}

#[test]
fn active_mode_transfer_via_port_command() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/data.bin"), b"active-mode").expect("seed");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");
    client.send("TYPE I");
    client.expect(200);

    let listener = TcpListener::bind("127.0.0.1:0").expect("data listener");
    let data_port = listener.local_addr().expect("addr").port();
    client.send(&format!(
        "PORT 127,0,0,1,{},{}",
        data_port >> 8,
        data_port & 0xff
    ));
    client.expect(200);

    client.send("RETR data.bin");
    let (data, _peer) = listener.accept().expect("server connect");
    client.expect(150);
    assert_eq!(read_to_end(data), b"active-mode");
    client.expect(226);
}

#[test]
fn listing_renders_unix_style_lines() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/one.txt"), b"1").expect("seed one");
    fs::create_dir(server.root_path.join("pub/sub")).expect("seed sub");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    let data = client.open_passive();
    client.send("LIST");
    client.expect(150);
    let listing = String::from_utf8(read_to_end(data)).expect("utf8 listing");
    client.expect(226);

    let lines: Vec<&str> = listing.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2, "listing: {listing:?}");
    assert!(lines.iter().any(|l| l.starts_with('-') && l.ends_with("one.txt")));
    assert!(lines.iter().any(|l| l.starts_with('d') && l.ends_with("sub")));

    let data = client.open_passive();
    client.send("NLST");
    client.expect(150);
    let names = String::from_utf8(read_to_end(data)).expect("utf8 names");
    client.expect(226);
    assert_eq!(names, "one.txt\r\nsub\r\n");
}

#[test]
fn list_of_a_single_file_argument() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/solo.txt"), b"solo").expect("seed");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    let data = client.open_passive();
    client.send("LIST solo.txt");
    client.expect(150);
    let listing = String::from_utf8(read_to_end(data)).expect("utf8 listing");
    client.expect(226);

    let lines: Vec<&str> = listing.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 1, "listing: {listing:?}");
    assert!(lines[0].ends_with("solo.txt"));
}

#[test]
fn size_and_mdtm_report_file_facts() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/sized.bin"), vec![0u8; 1234]).expect("seed");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    client.send("SIZE sized.bin");
    assert_eq!(client.read_line(), "213 1234");

    client.send("MDTM sized.bin");
    let line = client.expect(213);
    let stamp = line.trim_start_matches("213 ");
    assert_eq!(stamp.len(), 14, "MDTM stamp: {stamp}");
    assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
}

#[test]
fn feat_advertises_extensions() {
    let server = start_server(false);
    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    client.send("FEAT");
    let block = client.expect_block(211);
    assert_eq!(
        block,
        vec![
            "211-Features:".to_string(),
            " SIZE".to_string(),
            " MDTM".to_string(),
            " REST STREAM".to_string(),
            "211 End".to_string(),
        ]
    );
}

#[test]
fn directory_lifecycle_with_permissions() {
    let server = start_server(true);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("alice", "secret");

    client.send("MKD workspace");
    assert_eq!(client.read_line(), "257 \"/workspace\" created");
    client.send("CWD workspace");
    client.expect(250);

    client.send("TYPE I");
    client.expect(200);
    let mut data = client.open_passive();
    client.send("STOR f.bin");
    client.expect(150);
    data.write_all(b"x").expect("upload");
    drop(data);
    client.expect(226);

    client.send("DELE f.bin");
    client.expect(250);
    client.send("CDUP");
    client.expect(250);
    client.send("RMD workspace");
    client.expect(250);
    assert!(!server.root_path.join("workspace").exists());
}

#[test]
fn anonymous_is_read_only() {
    let server = start_server(false);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    let _data = client.open_passive();
    client.send("STOR nope.bin");
    assert_eq!(client.read_line(), "550 Permission denied");

    client.send("DELE nope.bin");
    client.expect(550);
    client.send("MKD nope");
    client.expect(550);
}

#[test]
fn commands_require_login() {
    let server = start_server(false);
    let mut client = Client::connect(server.port);
    client.expect(220);

    client.send("CWD /pub");
    client.expect(530);
    client.send("LIST");
    client.expect(530);
    client.send("NOOP");
    client.expect(200);
}

#[test]
fn unknown_and_malformed_verbs() {
    let server = start_server(false);
    let mut client = Client::connect(server.port);
    client.expect(220);

    client.send("XYZZ");
    client.expect(502);
    client.send("123 nope");
    client.expect(500);
    client.send("ACCT blah");
    // ACCT is registered but unimplemented; still gated by login.
    client.expect(530);
}

#[test]
fn ebcdic_and_exotic_modes_are_rejected() {
    let server = start_server(false);
    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    client.send("TYPE E");
    client.expect(504);
    client.send("MODE B");
    client.expect(504);
    client.send("STRU R");
    client.expect(504);
    client.send("MODE S");
    client.expect(200);
    client.send("STRU F");
    client.expect(200);
}

#[test]
fn connection_cap_turns_clients_away() {
    let root = TempDir::new().expect("tempdir");
    let port = allocate_test_port();
    let mut config = test_config(root.path(), port);
    config.max_connections = Some(1);
    spawn_daemon(config);

    let mut first = Client::connect(port);
    first.expect(220);

    let mut second = Client::connect(port);
    assert_eq!(
        second.read_line(),
        "421 Service not available, too many connections"
    );
    assert!(second.eof());

    // The slot frees once the first client leaves.
    first.send("QUIT");
    first.expect_block(221);
    thread::sleep(Duration::from_millis(200));
    let mut third = Client::connect(port);
    third.expect(220);
}

#[test]
fn appe_appends_to_an_existing_file() {
    let server = start_server(true);

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("alice", "secret");
    client.send("TYPE I");
    client.expect(200);

    let mut data = client.open_passive();
    client.send("STOR log.txt");
    client.expect(150);
    data.write_all(b"first|").expect("first upload");
    drop(data);
    client.expect(226);

    let mut data = client.open_passive();
    client.send("APPE log.txt");
    client.expect(150);
    data.write_all(b"second").expect("append upload");
    drop(data);
    client.expect(226);

    assert_eq!(
        fs::read(server.root_path.join("log.txt")).expect("appended file"),
        b"first|second"
    );
}

#[test]
fn transfer_without_data_mode_gets_425() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/x.bin"), b"x").expect("seed");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");

    client.send("RETR x.bin");
    client.expect(150);
    client.expect(425);
}

#[test]
fn rein_resets_session_but_keeps_statistics() {
    let server = start_server(false);
    fs::write(server.root_path.join("pub/r.bin"), b"0123456789").expect("seed");

    let mut client = Client::connect(server.port);
    client.expect(220);
    client.login("anonymous", "user@example.com");
    client.send("TYPE I");
    client.expect(200);

    let data = client.open_passive();
    client.send("RETR r.bin");
    client.expect(150);
    assert_eq!(read_to_end(data).len(), 10);
    client.expect(226);

    client.send("REIN");
    client.expect(220);

    // Back to the unauthenticated state.
    client.send("PWD");
    client.expect(530);

    // Statistics survive into the next login's QUIT report.
    client.login("anonymous", "user@example.com");
    client.send("QUIT");
    let block = client.expect_block(221);
    assert!(
        block.iter().any(|line| line.contains("Bytes downloaded: 10")),
        "stats lost across REIN: {block:?}"
    );
}
