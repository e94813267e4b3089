use culvert::RuntimeBuilder;
use culvert::net::UdpSocket;
use std::net::UdpSocket as StdUdpSocket;

#[test]
fn datagram_round_trip_with_std_peer() {
    let peer = StdUdpSocket::bind("127.0.0.1:0").expect("bind std socket");
    let peer_addr = peer.local_addr().expect("local addr");

    let echo = std::thread::spawn(move || {
        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).expect("recv_from");
        peer.send_to(&buf[..n], from).expect("send_to");
    });

    let mut rt = RuntimeBuilder::new().enable_net().build();
    rt.block_on(async move {
        let socket = UdpSocket::for_peer(&peer_addr).expect("create socket");

        let sent = socket.send_to(peer_addr, b"datagram").await.expect("send_to");
        assert_eq!(sent, 8);

        let mut buf = [0u8; 16];
        let (n, from) = socket.recv_from(&mut buf).await.expect("recv_from");
        assert_eq!(&buf[..n], b"datagram");
        assert_eq!(from, peer_addr, "reply should come from the peer we sent to");
    });

    echo.join().unwrap();
}

#[test]
#[should_panic(expected = "enable_net")]
fn sockets_require_the_net_subsystem() {
    let mut rt = RuntimeBuilder::new().build();
    rt.block_on(async {
        let _ = UdpSocket::for_peer(&"127.0.0.1:53".parse().unwrap());
    });
}
