use simulith::peripheral::uart::UartPort;
use simulith::peripheral::{PeripheralTransport, Role};
use std::thread::sleep;
use std::time::Duration;

fn poll_until<F: FnMut() -> bool>(mut f: F) -> bool {
    for _ in 0..200 {
        if f() {
            return true;
        }
        sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn uart_pair_exchanges_messages_over_udp() {
    let mut server = UartPort::new("uart_srv", "127.0.0.1:17100", Role::Server).unwrap();
    let mut client = UartPort::new("uart_cli", "127.0.0.1:17100", Role::Client).unwrap();
    server.init().unwrap();
    client.init().unwrap();

    client.send(b"hello").unwrap();
    assert!(poll_until(|| server.available().unwrap_or(false)));

    let mut buf = [0u8; 5];
    assert_eq!(server.receive(&mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");

    server.send(b"world").unwrap();
    assert!(poll_until(|| client.available().unwrap_or(false)));
    let mut buf2 = [0u8; 5];
    assert_eq!(client.receive(&mut buf2).unwrap(), 5);
    assert_eq!(&buf2, b"world");

    server.close().unwrap();
    client.close().unwrap();
}

#[test]
fn uart_server_cannot_send_before_hearing_from_a_peer() {
    let mut server = UartPort::new("uart_srv_silent", "127.0.0.1:17001", Role::Server).unwrap();
    server.init().unwrap();
    assert!(server.send(b"too early").is_err());
}
