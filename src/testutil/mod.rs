use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::time::Instant;

use crate::error::SimError;
use crate::sip::message::SipRequest;
use crate::sip::parser::parse_request;
use crate::transport::{SendFuture, Transport};

/// 記録された送信データグラム
#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub data: Vec<u8>,
    pub addr: SocketAddr,
    pub at: Instant,
}

/// テスト用の共通モックトランスポート
/// - 送信データグラムと送信時刻の記録
/// - 送信カウント
/// - 失敗注入（常時 / 次のN回）
pub struct MockTransport {
    pub sent: Mutex<Vec<SentDatagram>>,
    pub send_count: AtomicUsize,
    pub should_fail: AtomicBool,
    fail_remaining: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            send_count: AtomicUsize::new(0),
            should_fail: AtomicBool::new(false),
            fail_remaining: AtomicUsize::new(0),
        }
    }

    /// should_fail フラグを設定する
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// 次の `n` 回の送信を失敗させる
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::Relaxed);
    }

    /// 送信成功したデータグラム数
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn datagrams(&self) -> Vec<SentDatagram> {
        self.sent.lock().unwrap().clone()
    }

    /// 送信されたリクエストをパースして返す（パースできないものは除外）
    pub fn sent_requests(&self) -> Vec<(SipRequest, SocketAddr)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| parse_request(&d.data).ok().map(|req| (req, d.addr)))
            .collect()
    }

    fn take_failure(&self) -> bool {
        if self.should_fail.load(Ordering::Relaxed) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Transport for MockTransport {
    fn send_to<'a>(&'a self, data: &'a [u8], addr: SocketAddr) -> SendFuture<'a> {
        Box::pin(async move {
            self.send_count.fetch_add(1, Ordering::Relaxed);
            if self.take_failure() {
                return Err(SimError::NetworkError(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "mock failure",
                )));
            }
            self.sent.lock().unwrap().push(SentDatagram {
                data: data.to_vec(),
                addr,
                at: Instant::now(),
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr() -> SocketAddr {
        "127.0.0.1:5060".parse().unwrap()
    }

    #[tokio::test]
    async fn mock_transport_records_sent_datagram() {
        let transport = MockTransport::new();
        let data = b"REGISTER sip:example.com SIP/2.0\r\n";

        transport.send_to(data, addr()).await.unwrap();

        let sent = transport.datagrams();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data, data.to_vec());
        assert_eq!(sent[0].addr, addr());
    }

    #[tokio::test]
    async fn mock_transport_tracks_send_count_even_on_failure() {
        let transport = MockTransport::new();
        transport.set_should_fail(true);

        assert!(transport.send_to(b"data", addr()).await.is_err());
        assert_eq!(transport.send_count.load(Ordering::Relaxed), 1);
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn mock_transport_fail_next_recovers() {
        let transport = MockTransport::new();
        transport.fail_next(2);

        assert!(transport.send_to(b"a", addr()).await.is_err());
        assert!(transport.send_to(b"b", addr()).await.is_err());
        assert!(transport.send_to(b"c", addr()).await.is_ok());
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mock_transport_records_send_time() {
        let transport = MockTransport::new();
        let start = Instant::now();
        transport.send_to(b"a", addr()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        transport.send_to(b"b", addr()).await.unwrap();

        let sent = transport.datagrams();
        assert_eq!(sent[0].at, start);
        assert_eq!(sent[1].at - sent[0].at, std::time::Duration::from_millis(250));
    }

    #[tokio::test]
    async fn mock_transport_sent_requests_skips_non_sip() {
        let transport = MockTransport::new();
        let register = b"REGISTER sip:example.com SIP/2.0\r\n\
            Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1\r\n\
            Content-Length: 0\r\n\r\n";
        transport.send_to(register, addr()).await.unwrap();
        transport.send_to(b"\x80\x60rtp", addr()).await.unwrap();

        let requests = transport.sent_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.request_uri, "sip:example.com");
    }

    #[test]
    fn mock_transport_implements_transport() {
        let transport = Arc::new(MockTransport::new());
        let _: Arc<dyn Transport> = transport;
    }

    use proptest::prelude::*;
    use proptest::collection::vec as arb_vec;

    fn arb_socket_addr() -> impl Strategy<Value = SocketAddr> {
        (any::<[u8; 4]>(), 1u16..=65535u16).prop_map(|(ip, port)| SocketAddr::from((ip, port)))
    }

    proptest! {
        /// 送信したすべてのデータグラムが順序どおりに記録される
        #[test]
        fn prop_mock_transport_records_in_order(
            ops in arb_vec((arb_vec(any::<u8>(), 0..256), arb_socket_addr()), 0..20)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let transport = MockTransport::new();
            rt.block_on(async {
                for (data, addr) in &ops {
                    transport.send_to(data, *addr).await.unwrap();
                }
            });
            let sent = transport.datagrams();
            prop_assert_eq!(sent.len(), ops.len());
            for (d, (data, addr)) in sent.iter().zip(ops.iter()) {
                prop_assert_eq!(&d.data, data);
                prop_assert_eq!(d.addr, *addr);
            }
        }
    }
}
