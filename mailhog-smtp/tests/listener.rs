use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use mailhog_common::{Signal, error::ListenerError};
use mailhog_smtp::{ChaosMonkey, Listener, SessionConfig, TlsContext};
use mailhog_storage::{InMemory, Storage};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::broadcast,
};

#[derive(Debug)]
struct Doorman;

impl ChaosMonkey for Doorman {
    fn accept(&self, _: SocketAddr) -> bool {
        false
    }
    fn link_speed(&self) -> Option<u64> {
        None
    }
    fn valid_mail(&self, _: &str) -> bool {
        true
    }
    fn valid_rcpt(&self, _: &str) -> bool {
        true
    }
    fn valid_auth(&self, _: &str, _: &[&str]) -> bool {
        true
    }
    fn disconnect(&self) -> bool {
        false
    }
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn accepts_and_shuts_down() {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let storage = Arc::new(InMemory::new());
    let listener = Listener::new(
        address,
        SessionConfig::builder()
            .with_hostname("test.local")
            .with_storage(storage.clone())
            .build(),
    );

    let (shutdown, signal) = broadcast::channel(4);
    let server = tokio::spawn(async move { listener.serve_on(socket, signal).await });

    let mut client = BufReader::new(TcpStream::connect(address).await.unwrap());
    assert_eq!(read_line(&mut client).await, "220 test.local ESMTP MailHog\r\n");

    client
        .get_mut()
        .write_all(b"HELO me\r\nMAIL FROM:<a@b>\r\nRCPT TO:<c@d>\r\nDATA\r\nhello\r\n.\r\nQUIT\r\n")
        .await
        .unwrap();

    assert_eq!(read_line(&mut client).await, "250 Hello me\r\n");
    assert_eq!(read_line(&mut client).await, "250 Sender a@b ok\r\n");
    assert_eq!(read_line(&mut client).await, "250 Recipient c@d ok\r\n");
    assert_eq!(read_line(&mut client).await, "354 End data with <CR><LF>.<CR><LF>\r\n");
    assert!(read_line(&mut client).await.starts_with("250 Ok: queued as "));
    assert_eq!(read_line(&mut client).await, "221 Bye\r\n");
    assert_eq!(read_line(&mut client).await, "");

    assert_eq!(storage.count(), 1);
    let stored = &storage.list(0, 1).unwrap()[0];
    assert!(stored.id.as_str().ends_with("@test.local"));

    shutdown.send(Signal::Shutdown).unwrap();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn monkey_can_refuse_connections() {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let listener = Listener::new(
        address,
        SessionConfig::builder().with_monkey(Arc::new(Doorman)).build(),
    );

    let (shutdown, signal) = broadcast::channel(4);
    let server = tokio::spawn(async move { listener.serve_on(socket, signal).await });

    let mut client = BufReader::new(TcpStream::connect(address).await.unwrap());
    assert_eq!(read_line(&mut client).await, "");

    shutdown.send(Signal::Shutdown).unwrap();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn missing_tls_files_fail_fast() {
    let listener = Listener::new(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        SessionConfig::default(),
    )
    .with_tls(TlsContext {
        certificate: PathBuf::from("/nonexistent/mailhog/cert.pem"),
        key: PathBuf::from("/nonexistent/mailhog/key.pem"),
    });

    let (_shutdown, signal) = broadcast::channel(1);
    let err = listener.serve(signal).await.unwrap_err();

    assert!(matches!(
        err,
        ListenerError::MissingTlsFile { kind: "certificate", .. }
    ));
    assert_eq!(
        err.to_string(),
        "Unable to find TLS certificate /nonexistent/mailhog/cert.pem"
    );
}

fn test_certs(key: &str) -> TlsContext {
    let certs = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/certs");
    TlsContext {
        certificate: certs.join("cert.pem"),
        key: certs.join(key),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn unusable_key_fails_before_serving() {
    let listener = Listener::new(SocketAddr::from(([127, 0, 0, 1], 0)), SessionConfig::default())
        .with_tls(test_certs("cert.pem"));

    let (_shutdown, signal) = broadcast::channel(1);
    let err = listener.serve(signal).await.unwrap_err();

    assert!(matches!(err, ListenerError::Tls(_)));
    assert_eq!(
        err.to_string(),
        "Unable to load TLS configuration: No private key found"
    );
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn loaded_certificate_offers_starttls() {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let listener = Listener::new(address, SessionConfig::default()).with_tls(test_certs("key.pem"));

    let (shutdown, signal) = broadcast::channel(1);
    let server = tokio::spawn(async move { listener.serve_on(socket, signal).await });

    let mut client = BufReader::new(TcpStream::connect(address).await.unwrap());
    read_line(&mut client).await;
    client.get_mut().write_all(b"EHLO me\r\n").await.unwrap();

    let mut extensions = Vec::new();
    loop {
        let line = read_line(&mut client).await;
        let last = line.as_bytes().get(3) == Some(&b' ');
        extensions.push(line);
        if last {
            break;
        }
    }
    assert!(extensions.contains(&"250-STARTTLS\r\n".to_string()), "{extensions:?}");

    client.get_mut().write_all(b"QUIT\r\n").await.unwrap();
    assert_eq!(read_line(&mut client).await, "221 Bye\r\n");

    shutdown.send(Signal::Shutdown).unwrap();
    assert!(server.await.unwrap().is_ok());
}
