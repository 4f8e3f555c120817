//! Round-trip tests over complete messages: parse(serialize(m)) == m.

use rtext_sip_core::{parse_message, Method, RequestBuilder, ResponseBuilder, SipMessage};

#[test]
fn invite_with_sdp_body_round_trips() {
    let sdp_body = "v=0\r\n\
o=alice 2890844526 2890844526 IN IP4 client.atlanta.example.com\r\n\
s=-\r\n\
c=IN IP4 192.0.2.101\r\n\
t=0 0\r\n\
m=text 11000 RTP/AVP 98 99\r\n\
a=rtpmap:98 t140/1000\r\n\
a=rtpmap:99 red/1000\r\n\
a=fmtp:99 98/98/98\r\n";

    let request = RequestBuilder::new(Method::Invite, "sip:bob@biloxi.example.com")
        .via("client.atlanta.example.com:5060", "UDP", "z9hG4bK74bf9")
        .from("Alice", "sip:alice@atlanta.example.com", Some("9fxced76sl"))
        .to("Bob", "sip:bob@biloxi.example.com", None)
        .call_id("3848276298220188511@atlanta.example.com")
        .cseq(1)
        .max_forwards(70)
        .contact("sip:alice@client.atlanta.example.com")
        .content_type("application/sdp")
        .body(sdp_body)
        .build();

    let wire = request.to_bytes();
    let parsed = parse_message(&wire).unwrap();

    let SipMessage::Request(reparsed) = parsed else {
        panic!("expected request");
    };
    assert_eq!(reparsed, request);
    assert_eq!(&reparsed.body[..], sdp_body.as_bytes());
    assert!(reparsed.is_valid());
}

#[test]
fn response_round_trips_with_header_order_preserved() {
    let response = ResponseBuilder::new(180, "Ringing")
        .unwrap()
        .via_raw("SIP/2.0/UDP client.atlanta.example.com:5060;branch=z9hG4bK74bf9")
        .from_raw("\"Alice\" <sip:alice@atlanta.example.com>;tag=9fxced76sl")
        .to_raw("\"Bob\" <sip:bob@biloxi.example.com>;tag=314159")
        .call_id("3848276298220188511@atlanta.example.com")
        .cseq(1, Method::Invite)
        .header("Record-Route", "<sip:p1.example.com;lr>")
        .header("Record-Route", "<sip:p2.example.com;lr>")
        .build();

    let wire = response.to_bytes();
    let SipMessage::Response(reparsed) = parse_message(&wire).unwrap() else {
        panic!("expected response");
    };
    assert_eq!(reparsed, response);

    // Both Record-Route values survive in order
    let routes = reparsed.headers.get_all("Record-Route");
    assert_eq!(routes.len(), 2);
    assert!(routes[0].contains("p1.example.com"));
    assert!(routes[1].contains("p2.example.com"));
    assert_eq!(reparsed.to_tag().as_deref(), Some("314159"));
}

#[test]
fn double_serialization_is_stable() {
    let request = RequestBuilder::new(Method::Register, "sip:registrar.example.com")
        .via("client.example.com", "TCP", "z9hG4bK-reg-1")
        .from("", "sip:alice@example.com", Some("88sja8x"))
        .to("", "sip:alice@example.com", None)
        .call_id("reg-call-1")
        .cseq(2)
        .max_forwards(70)
        .build();

    let first = request.to_bytes();
    let reparsed = parse_message(&first).unwrap();
    let second = reparsed.to_bytes();
    assert_eq!(first, second);
}
