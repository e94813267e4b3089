use culvert::RuntimeBuilder;
use culvert::net::dns::{RecordType, Resolver, decode_answer, decode_name, encode_name, encode_query};
use culvert::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket as StdUdpSocket};

#[test]
fn name_encoding_round_trips() {
    let mut wire = Vec::new();
    encode_name(&mut wire, "www.example.com").expect("encode");
    assert_eq!(
        wire,
        [
            3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm',
            0
        ]
    );

    let mut offset = 0;
    let name = decode_name(&wire, &mut offset).expect("decode");
    assert_eq!(name, "www.example.com");
    assert_eq!(offset, wire.len());
}

#[test]
fn oversized_label_is_rejected() {
    let label = "a".repeat(64);
    let mut wire = Vec::new();
    let err = encode_name(&mut wire, &label).expect_err("64-byte label must fail");
    assert!(matches!(err, Error::LabelTooLong));
}

#[test]
fn compressed_name_decodes_and_advances_two_bytes() {
    // "example.com" at offset 0, then a name "www" + pointer back to it.
    let mut message = Vec::new();
    encode_name(&mut message, "example.com").expect("encode");

    let pointer_at = message.len();
    message.push(3);
    message.extend_from_slice(b"www");
    message.extend_from_slice(&[0xC0, 0x00]);
    message.extend_from_slice(b"trailing");

    let mut offset = pointer_at;
    let name = decode_name(&message, &mut offset).expect("decode");
    assert_eq!(name, "www.example.com");
    assert_eq!(
        offset,
        pointer_at + 4 + 2,
        "cursor should advance past the label and the 2-byte pointer only"
    );
}

#[test]
fn pointer_loop_is_detected() {
    // A pointer that refers to itself.
    let message = [0xC0u8, 0x00];
    let mut offset = 0;
    let err = decode_name(&message, &mut offset).expect_err("self-referential pointer");
    assert!(matches!(err, Error::PointerLoop));
}

#[test]
fn truncated_name_is_reported() {
    // Length byte promises 5 bytes, message ends after 2.
    let message = [5u8, b'a', b'b'];
    let mut offset = 0;
    let err = decode_name(&message, &mut offset).expect_err("truncated label");
    assert!(matches!(err, Error::Truncated { .. }));
}

#[test]
fn query_layout_matches_the_wire_format() {
    let query = encode_query("example.com", 0x4241, RecordType::A).expect("encode query");

    // Header: id, flags (RD), counts.
    assert_eq!(&query[0..2], &[0x42, 0x41]);
    assert_eq!(&query[2..4], &[0x01, 0x00]);
    assert_eq!(&query[4..6], &[0x00, 0x01], "one question");
    assert_eq!(&query[6..8], &[0x00, 0x00], "no answers");
    assert_eq!(&query[8..10], &[0x00, 0x00], "no authorities");
    assert_eq!(&query[10..12], &[0x00, 0x01], "one additional (OPT)");

    // Question name, then type A and class IN.
    let mut offset = 12;
    let name = decode_name(&query, &mut offset).expect("question name");
    assert_eq!(name, "example.com");
    assert_eq!(&query[offset..offset + 2], &[0x00, 0x01]);
    assert_eq!(&query[offset + 2..offset + 4], &[0x00, 0x01]);

    // OPT record: root name, type 41, 512-byte payload class.
    let opt = offset + 4;
    assert_eq!(query[opt], 0, "OPT owner is the root name");
    assert_eq!(&query[opt + 1..opt + 3], &[0x00, 0x29]);
    assert_eq!(&query[opt + 3..opt + 5], &[0x02, 0x00]);
}

fn reply_with_answer(request: &[u8], data: &[u8], record_type: u16) -> Vec<u8> {
    let mut reply = request[..2].to_vec();
    reply.extend_from_slice(&[0x81, 0x80]); // response, RD+RA
    reply.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    reply.extend_from_slice(&[0x00, 0x01]); // ANCOUNT
    reply.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    // Echo the question section.
    let question_end = {
        let mut offset = 12;
        decode_name(request, &mut offset).expect("question name");
        offset + 4
    };
    reply.extend_from_slice(&request[12..question_end]);

    // Answer: pointer to the question name, type, class IN, TTL, data.
    reply.extend_from_slice(&[0xC0, 0x0C]);
    reply.extend_from_slice(&record_type.to_be_bytes());
    reply.extend_from_slice(&[0x00, 0x01]);
    reply.extend_from_slice(&[0x00, 0x00, 0x00, 0x3C]);
    reply.extend_from_slice(&(data.len() as u16).to_be_bytes());
    reply.extend_from_slice(data);
    reply
}

#[test]
fn answer_decoding_yields_both_families() {
    let query_a = encode_query("example.com", 0x4241, RecordType::A).unwrap();
    let reply_a = reply_with_answer(&query_a, &[93, 184, 216, 34], RecordType::A as u16);
    let addr = decode_answer(&reply_a, 443).expect("decode").expect("answer");
    assert_eq!(
        addr,
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), 443)
    );

    let query_aaaa = encode_query("example.com", 0x4242, RecordType::Aaaa).unwrap();
    let six = Ipv6Addr::new(0x2606, 0x2800, 0x220, 0x1, 0x248, 0x1893, 0x25c8, 0x1946);
    let reply_aaaa = reply_with_answer(&query_aaaa, &six.octets(), RecordType::Aaaa as u16);
    let addr = decode_answer(&reply_aaaa, 443).expect("decode").expect("answer");
    assert_eq!(addr, SocketAddr::new(IpAddr::V6(six), 443));
}

#[test]
fn unknown_record_types_are_discarded() {
    let query = encode_query("example.com", 0x4241, RecordType::A).unwrap();
    // CNAME-ish record with a 2-byte payload.
    let reply = reply_with_answer(&query, &[0xC0, 0x0C], 5);
    let decoded = decode_answer(&reply, 80).expect("decode");
    assert!(decoded.is_none(), "unknown record types should yield nothing");
}

#[test]
fn empty_reply_yields_no_address() {
    let query = encode_query("example.com", 0x4241, RecordType::A).unwrap();
    let mut reply = query.clone();
    reply[2] = 0x81; // response bit
    let decoded = decode_answer(&reply, 80).expect("decode");
    assert!(decoded.is_none());
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn resolver_collects_a_and_aaaa_from_the_server() {
    init_tracing();

    let server = StdUdpSocket::bind("127.0.0.1:0").expect("bind server");
    let server_addr = server.local_addr().expect("local addr");

    let server_thread = std::thread::spawn(move || {
        let mut buf = [0u8; 576];
        for _ in 0..2 {
            let (n, client) = server.recv_from(&mut buf).expect("recv query");
            let request = &buf[..n];

            // The question type picks the answer family.
            let mut offset = 12;
            decode_name(request, &mut offset).expect("question name");
            let qtype = u16::from_be_bytes([request[offset], request[offset + 1]]);

            let reply = if qtype == RecordType::Aaaa as u16 {
                reply_with_answer(request, &Ipv6Addr::LOCALHOST.octets(), RecordType::Aaaa as u16)
            } else {
                reply_with_answer(request, &[127, 0, 0, 1], RecordType::A as u16)
            };
            server.send_to(&reply, client).expect("send reply");
        }
    });

    let mut rt = RuntimeBuilder::new().enable_net().build();
    let addresses = rt.block_on(async move {
        Resolver::new(server_addr)
            .resolve("example.com", 8080)
            .await
            .expect("resolve")
    });

    server_thread.join().unwrap();

    assert_eq!(addresses.len(), 2, "one address per record type");
    assert!(addresses.contains(&SocketAddr::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        8080
    )));
    assert!(addresses.contains(&SocketAddr::new(
        IpAddr::V6(Ipv6Addr::LOCALHOST),
        8080
    )));
}

#[test]
fn resolver_ignores_datagrams_from_other_sources() {
    init_tracing();

    let server = StdUdpSocket::bind("127.0.0.1:0").expect("bind server");
    let server_addr = server.local_addr().expect("local addr");

    let server_thread = std::thread::spawn(move || {
        let meddler = StdUdpSocket::bind("127.0.0.1:0").expect("bind meddler");
        let mut buf = [0u8; 576];
        for round in 0..2 {
            let (n, client) = server.recv_from(&mut buf).expect("recv query");
            let request = &buf[..n];

            // Shove garbage at the client from an unrelated port before the
            // real answer arrives.
            if round == 0 {
                meddler.send_to(b"not a dns reply", client).expect("meddle");
            }

            let mut offset = 12;
            decode_name(request, &mut offset).expect("question name");
            let qtype = u16::from_be_bytes([request[offset], request[offset + 1]]);

            let reply = if qtype == RecordType::Aaaa as u16 {
                reply_with_answer(request, &Ipv6Addr::LOCALHOST.octets(), RecordType::Aaaa as u16)
            } else {
                reply_with_answer(request, &[127, 0, 0, 1], RecordType::A as u16)
            };
            server.send_to(&reply, client).expect("send reply");
        }
    });

    let mut rt = RuntimeBuilder::new().enable_net().build();
    let addresses = rt.block_on(async move {
        Resolver::new(server_addr)
            .resolve("example.com", 8080)
            .await
            .expect("resolve")
    });

    server_thread.join().unwrap();

    assert_eq!(
        addresses.len(),
        2,
        "foreign datagrams must not count as replies"
    );
    assert!(addresses.contains(&SocketAddr::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        8080
    )));
    assert!(addresses.contains(&SocketAddr::new(
        IpAddr::V6(Ipv6Addr::LOCALHOST),
        8080
    )));
}

#[test]
fn resolver_timeout_fires_when_the_server_is_silent() {
    let server = StdUdpSocket::bind("127.0.0.1:0").expect("bind server");
    let server_addr = server.local_addr().expect("local addr");

    let mut rt = RuntimeBuilder::new().enable_net().build();
    let result = rt.block_on(async move {
        Resolver::new(server_addr)
            .with_timeout(std::time::Duration::from_millis(50))
            .resolve("example.com", 80)
            .await
    });

    assert!(matches!(result, Err(Error::TimedOut)));
}

#[test]
fn resolver_recovers_after_a_timed_out_exchange() {
    init_tracing();

    let server = StdUdpSocket::bind("127.0.0.1:0").expect("bind server");
    let server_addr = server.local_addr().expect("local addr");

    let server_thread = std::thread::spawn(move || {
        let mut buf = [0u8; 576];

        // Stay silent for the first attempt's two queries; the client's
        // receive future is dropped mid-flight when its deadline fires.
        for _ in 0..2 {
            server.recv_from(&mut buf).expect("recv query");
        }

        // Answer the retry normally.
        for _ in 0..2 {
            let (n, client) = server.recv_from(&mut buf).expect("recv query");
            let request = &buf[..n];

            let mut offset = 12;
            decode_name(request, &mut offset).expect("question name");
            let qtype = u16::from_be_bytes([request[offset], request[offset + 1]]);

            let reply = if qtype == RecordType::Aaaa as u16 {
                reply_with_answer(request, &Ipv6Addr::LOCALHOST.octets(), RecordType::Aaaa as u16)
            } else {
                reply_with_answer(request, &[127, 0, 0, 1], RecordType::A as u16)
            };
            server.send_to(&reply, client).expect("send reply");
        }
    });

    let mut rt = RuntimeBuilder::new().enable_net().build();
    let addresses = rt.block_on(async move {
        let first = Resolver::new(server_addr)
            .with_timeout(std::time::Duration::from_millis(50))
            .resolve("example.com", 80)
            .await;
        assert!(matches!(first, Err(Error::TimedOut)));

        // The abandoned socket is closed; this attempt reuses its
        // descriptor number and must not inherit its parked waker.
        Resolver::new(server_addr)
            .resolve("example.com", 80)
            .await
            .expect("second attempt")
    });

    server_thread.join().unwrap();

    assert_eq!(addresses.len(), 2, "the retry should complete normally");
}
