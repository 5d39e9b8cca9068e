//! Integration tests for the AIR780E engine
//!
//! These tests drive the client, listener and control socket against the
//! in-process fake modem in `common`.

mod common;

use air780e_sms::client::SmsClient;
use air780e_sms::codec::{gsm7, Address, Charset};
use air780e_sms::commands;
use air780e_sms::config::Config;
use air780e_sms::control::{send_via_socket, ControlServer, SendRequest};
use air780e_sms::dispatcher::{BoxFuture, Dispatcher, Notification, NotificationHandler};
use air780e_sms::forwarder::{self, JsonlForwarder};
use air780e_sms::frame::{FrameStatus, ModemError};
use air780e_sms::listener::Listener;
use air780e_sms::{Error, Result};
use common::{FakeModem, Reply, OVERLAP};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::DuplexStream;

const UCS2_DELIVER: &str = "0891683108200505F0040D91683119325476F8000842105101035423044F60597D";

/// SMS-DELIVER from +8613912345678 with a GSM 7-bit body.
fn gsm7_deliver(text: &str) -> String {
    let septets = gsm7::to_septets(text).unwrap();
    let mut pdu = vec![0x00, 0x04];
    pdu.extend(Address::parse("+8613912345678").unwrap().encode().unwrap());
    pdu.extend([0x00, 0x00, 0x42, 0x10, 0x51, 0x01, 0x03, 0x54, 0x23]);
    pdu.push(septets.len() as u8);
    pdu.extend(gsm7::pack(&septets, 0));
    hex::encode_upper(pdu)
}

fn client_with<F>(temp: &TempDir, responder: F) -> (SmsClient<DuplexStream>, FakeModem)
where
    F: FnMut(&str) -> Reply + Send + 'static,
{
    let (transport, modem) = FakeModem::spawn(responder);
    (SmsClient::new(transport, Config::for_test(temp.path())), modem)
}

/// Handler that only records what it was given
struct Recorder(Arc<Mutex<Vec<(String, u32)>>>);

impl NotificationHandler for Recorder {
    fn on_incoming(&mut self, storage: String, index: u32) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.0.lock().unwrap().push((storage, index));
            Ok(())
        })
    }
}

/// Test that the command echo is dropped and the body is kept
#[tokio::test]
async fn test_manufacturer_query_filters_echo() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);

    let frame = client
        .raw(commands::MANUFACTURER, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(frame.command.as_deref(), Some(commands::MANUFACTURER));
    assert_eq!(frame.body, vec!["AirM2M".to_string()]);
    assert_eq!(frame.status, FrameStatus::Ok);

    assert_eq!(client.manufacturer().await.unwrap(), "AirM2M");
    assert_eq!(modem.log(), vec![commands::MANUFACTURER; 2]);
}

/// Test the PDU-mode init sequence
#[tokio::test]
async fn test_initialize_pdu_mode() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);

    client.initialize().await.unwrap();
    assert_eq!(
        modem.log(),
        vec![
            "AT",
            "AT+CMEE=1",
            "AT+CMGF=0",
            "AT+CPMS=\"ME\",\"ME\",\"ME\"",
            "AT+CNMI=2,1,0,0,0",
        ]
    );
}

/// Test that an unsolicited +CMTI reaches the handler while idle
#[tokio::test]
async fn test_unsolicited_cmti_reaches_handler() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(Box::new(Recorder(Arc::clone(&seen))));

    modem.inject("\r\n+CMTI: \"ME\",3\r\n");
    let notifications = client
        .poll_notifications(Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(
        notifications,
        vec![Notification::IncomingMessage {
            storage: "ME".to_string(),
            index: 3
        }]
    );

    dispatcher.dispatch_all(notifications).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![("ME".to_string(), 3)]);
}

/// Test that a silent modem times out close to the requested bound
#[tokio::test]
async fn test_timeout_is_bounded() {
    let temp = TempDir::new().unwrap();
    let (client, _modem) = client_with(&temp, |command| {
        if command == "AT+COPS=?" {
            Reply::Silent
        } else {
            Reply::ok()
        }
    });

    let started = Instant::now();
    let err = client
        .raw("AT+COPS=?", Duration::from_secs(2))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_secs(2), "gave up early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "gave up late: {:?}", elapsed);

    // the session is still usable afterwards
    let frame = client.raw("AT", Duration::from_secs(2)).await.unwrap();
    assert!(frame.is_ok());
}

/// Test that concurrent callers never interleave on the wire
#[tokio::test]
async fn test_concurrent_callers_never_overlap() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, |command| match command.strip_prefix("AT+ECHO=") {
        Some(n) => Reply::Delayed(
            Duration::from_millis(20),
            format!("\r\n+ECHO: {}\r\n\r\nOK\r\n", n),
        ),
        None => Reply::ok(),
    });

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let frame = client
                .raw(&format!("AT+ECHO={}", i), Duration::from_secs(2))
                .await
                .unwrap();
            (i, frame)
        }));
    }

    for handle in handles {
        let (i, frame) = handle.await.unwrap();
        assert_eq!(frame.body, vec![format!("+ECHO: {}", i)]);
    }
    assert_eq!(modem.count("AT+ECHO="), 8);
    assert_eq!(modem.count(OVERLAP), 0);
}

/// Test a PDU-mode send end to end
#[tokio::test]
async fn test_send_pdu() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);
    client.initialize().await.unwrap();

    let report = client.send("+8613912345678", "hellohello").await.unwrap();
    assert_eq!(report.references, vec![7]);

    let log = modem.log();
    assert!(log.contains(&"AT+CMGS=24".to_string()));
    assert!(log.contains(&"PAYLOAD:0011000D91683119325476F80000A70AE8329BFD4697D9EC37".to_string()));
}

/// Test a UCS2 text-mode send with a hex-encoded destination
#[tokio::test]
async fn test_send_text_ucs2() {
    let temp = TempDir::new().unwrap();
    let (transport, modem) = FakeModem::spawn(common::standard);
    let config = Config::for_test(temp.path()).with_text_mode(Charset::Ucs2);
    let client = SmsClient::new(transport, config);
    client.initialize().await.unwrap();

    let log = modem.log();
    assert!(log.contains(&"AT+CMGF=1".to_string()));
    assert!(log.contains(&"AT+CSCS=\"UCS2\"".to_string()));
    assert!(log.contains(&"AT+CSMP=17,167,0,8".to_string()));

    client.send("10086", "你好").await.unwrap();
    let log = modem.log();
    assert!(log.contains(&"AT+CMGS=\"00310030003000380036\"".to_string()));
    assert!(log.contains(&"PAYLOAD:4F60597D".to_string()));
}

/// Test that text that would end the input early is refused before anything is written
#[tokio::test]
async fn test_send_text_gsm_rejects_input_terminators() {
    let temp = TempDir::new().unwrap();
    let (transport, modem) = FakeModem::spawn(common::standard);
    let config = Config::for_test(temp.path()).with_text_mode(Charset::Gsm);
    let client = SmsClient::new(transport, config);
    client.initialize().await.unwrap();

    for text in ["AΞB", "price 5€"] {
        let err = client.send("10086", text).await.unwrap_err();
        assert!(
            matches!(err, Error::UnsupportedCharacter { .. }),
            "{:?} gave {:?}",
            text,
            err
        );
    }
    assert_eq!(modem.count("AT+CMGS="), 0);
    assert_eq!(modem.count("PAYLOAD:"), 0);

    client.send("10086", "A@B").await.unwrap();
    assert_eq!(modem.count("AT+CMGS="), 1);
}

/// Test that text-mode reads switch to PDU format, so a body line reading OK stays in the body
#[tokio::test]
async fn test_text_mode_reads_stored_messages_as_pdu() {
    let temp = TempDir::new().unwrap();
    let pdu = gsm7_deliver("reply\nOK\nthanks");
    let mut pdu_format = false;
    let (transport, modem) = FakeModem::spawn(move |command| {
        match command {
            "AT+CMGF=0" => pdu_format = true,
            "AT+CMGF=1" => pdu_format = false,
            "AT+CMGR=1" if pdu_format => {
                return Reply::Raw(format!("\r\n+CMGR: 0,,30\r\n{}\r\n\r\nOK\r\n", pdu))
            }
            "AT+CMGR=1" => {
                return Reply::Raw(
                    "\r\n+CMGR: \"REC READ\",\"+8613912345678\",,\"24/01/15,10:30:45+32\"\r\n\
                     reply\r\nOK\r\nthanks\r\n\r\nOK\r\n"
                        .to_string(),
                )
            }
            "AT+CMGL=4" if pdu_format => {
                return Reply::Raw(format!("\r\n+CMGL: 1,1,,30\r\n{}\r\n\r\nOK\r\n", pdu))
            }
            _ => {}
        }
        common::standard(command)
    });
    let config = Config::for_test(temp.path()).with_text_mode(Charset::Ira);
    let client = SmsClient::new(transport, config);
    client.initialize().await.unwrap();
    let before = modem.log().len();

    let message = client.read_message("ME", 1).await.unwrap().unwrap();
    assert_eq!(message.body, "reply\nOK\nthanks");
    assert_eq!(message.sender, "+8613912345678");
    assert_eq!(
        modem.log()[before..].to_vec(),
        vec!["AT+CMGF=0", "AT+CMGR=1", "AT+CMGF=1"]
    );

    let listed = client.list_messages("ME").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].body, "reply\nOK\nthanks");

    // back in text mode for sending
    client.send("10086", "hi").await.unwrap();
    assert!(modem.log().contains(&"AT+CMGS=\"10086\"".to_string()));
}

/// Test that a rejected send surfaces its code and is not retried
#[tokio::test]
async fn test_send_error_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, |command| {
        if command.starts_with("AT+CMGS=") {
            Reply::Prompt("\r\n+CMS ERROR: 500\r\n".to_string())
        } else {
            common::standard(command)
        }
    });
    client.initialize().await.unwrap();

    let err = client.send("10086", "hello").await.unwrap_err();
    match err {
        Error::ModemRejected { code, .. } => assert_eq!(code, ModemError::Cms("500".to_string())),
        other => panic!("expected ModemRejected, got {:?}", other),
    }
    assert_eq!(modem.count("AT+CMGS="), 1);
    assert_eq!(modem.count("PAYLOAD:"), 1);
}

/// Test that a plain ERROR before the prompt is returned as the rejection
#[tokio::test]
async fn test_plain_error_before_prompt() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, |command| {
        if command.starts_with("AT+CMGS=") {
            Reply::Raw("\r\nERROR\r\n".to_string())
        } else {
            common::standard(command)
        }
    });
    client.initialize().await.unwrap();

    let err = client.send("10086", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        Error::ModemRejected {
            code: ModemError::Error,
            ..
        }
    ));
    assert_eq!(modem.count("AT+CMGS="), 1);
    assert_eq!(modem.count("PAYLOAD:"), 0);
}

/// Test that a send before initialisation is refused without touching the modem
#[tokio::test]
async fn test_send_requires_negotiated_mode() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);

    let err = client.send("10086", "hello").await.unwrap_err();
    assert!(matches!(err, Error::ModeMismatch { .. }));
    assert_eq!(modem.count("AT+CMGS="), 0);
}

/// Test a missing input prompt: the send times out and ESC leaves input mode
#[tokio::test]
async fn test_missing_prompt_sends_escape() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, |command| {
        if command.starts_with("AT+CMGS=") {
            Reply::Silent
        } else {
            common::standard(command)
        }
    });
    client.initialize().await.unwrap();

    let err = client.send("10086", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(modem.wait_for("<ESC>", Duration::from_secs(1)).await);
}

/// Test the listener: sweep stored messages, then read, forward and delete on +CMTI
#[tokio::test]
async fn test_listener_forwards_and_deletes() {
    let temp = TempDir::new().unwrap();
    let stored: Arc<Mutex<HashMap<u32, String>>> = Arc::new(Mutex::new(HashMap::new()));
    stored.lock().unwrap().insert(1, UCS2_DELIVER.to_string());

    let slots = Arc::clone(&stored);
    let (client, modem) = client_with(&temp, move |command| {
        let mut slots = slots.lock().unwrap();
        if command == "AT+CMGL=4" {
            let mut indexes: Vec<u32> = slots.keys().copied().collect();
            indexes.sort();
            let mut reply = String::from("\r\n");
            for i in indexes {
                reply.push_str(&format!("+CMGL: {},0,,23\r\n{}\r\n", i, slots[&i]));
            }
            reply.push_str("\r\nOK\r\n");
            return Reply::Raw(reply);
        }
        if let Some(i) = command.strip_prefix("AT+CMGR=") {
            let i: u32 = i.parse().unwrap();
            return match slots.get(&i) {
                Some(pdu) => Reply::Raw(format!("\r\n+CMGR: 0,,23\r\n{}\r\n\r\nOK\r\n", pdu)),
                None => Reply::ok(),
            };
        }
        if let Some(i) = command.strip_prefix("AT+CMGD=") {
            slots.remove(&i.parse::<u32>().unwrap());
            return Reply::ok();
        }
        common::standard(command)
    });
    client.initialize().await.unwrap();

    let log_path = temp.path().join("messages.jsonl");
    let listener = Listener::new(client.clone(), Box::new(JsonlForwarder::new(&log_path)));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(listener.run(async move {
        let _ = stop_rx.await;
    }));

    assert!(modem.wait_for("AT+CMGD=1", Duration::from_secs(3)).await);

    stored.lock().unwrap().insert(3, UCS2_DELIVER.to_string());
    modem.inject("\r\n+CMTI: \"ME\",3\r\n");
    assert!(modem.wait_for("AT+CMGD=3", Duration::from_secs(3)).await);

    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    assert!(stored.lock().unwrap().is_empty());
    let records = forwarder::recent(&log_path, None, 10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].index, 1);
    assert_eq!(records[1].index, 3);
    assert_eq!(records[1].sender, "+8613912345678");
    assert_eq!(records[1].body, "你好");

    // the listener closes the device on the way out
    let err = client.raw("AT", Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, Error::DeviceClosed));
}

/// Test that a request over the control socket reaches the modem
#[tokio::test]
async fn test_control_socket_send() {
    let temp = TempDir::new().unwrap();
    let (client, modem) = client_with(&temp, common::standard);
    client.initialize().await.unwrap();

    let socket = temp.path().join("control.sock");
    let server = ControlServer::spawn(&socket, client.clone()).unwrap();

    let request = SendRequest {
        phone: "10086".to_string(),
        message: "balance".to_string(),
    };
    let response = send_via_socket(&socket, &request).await.unwrap().unwrap();
    assert!(response.ok, "send failed: {:?}", response.error);
    assert_eq!(response.references, vec![7]);
    assert_eq!(modem.count("AT+CMGS="), 1);

    server.shutdown().await;
    assert!(!socket.exists());
    assert!(send_via_socket(&socket, &request).await.unwrap().is_none());
}
