//! Sends one MS-CHAPv2 Access-Request (RFC 2548 attributes) and checks the
//! server's MS-CHAP2-Success, e.g. through a running relay.

use radius_proto::mschapv2::{check_authenticator_response, generate_nt_response};
use radius_proto::{
    Attribute, AttributeType, Code, MICROSOFT_VENDOR_ID, MicrosoftAttributeType, MsChap2Response,
    MsChap2Success, Packet, VendorSpecific,
};
use std::net::UdpSocket;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <username> <password> [relay_addr]", args[0]);
        eprintln!("Example: {} User clientPass 127.0.0.1:1812", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let relay_addr = args.get(3).map(|s| s.as_str()).unwrap_or("127.0.0.1:1812");

    println!("MS-CHAPv2 Client Test");
    println!("=====================");
    println!("Relay: {}", relay_addr);
    println!("Username: {}", username);
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(relay_addr)?;

    let request_auth: [u8; 16] = rand::random();
    let auth_challenge: [u8; 16] = rand::random();
    let peer_challenge: [u8; 16] = rand::random();
    let nt_response = generate_nt_response(&auth_challenge, &peer_challenge, username, password)?;

    let mut packet = Packet::new(Code::AccessRequest, 1, request_auth);
    packet.add_attribute(Attribute::string(AttributeType::UserName as u8, username.as_str())?);
    packet.add_attribute(
        VendorSpecific::microsoft(MicrosoftAttributeType::ChapChallenge, auth_challenge.to_vec())
            .to_attribute()?,
    );
    let response = MsChap2Response {
        ident: 1,
        flags: 0,
        peer_challenge,
        nt_response,
    };
    packet.add_attribute(
        VendorSpecific::microsoft(MicrosoftAttributeType::Chap2Response, response.to_bytes())
            .to_attribute()?,
    );

    let request_data = packet.encode()?;
    println!("Sending Access-Request ({} bytes)...", request_data.len());
    socket.send(&request_data)?;

    let mut buffer = vec![0u8; 4096];
    socket.set_read_timeout(Some(std::time::Duration::from_secs(5)))?;

    let len = match socket.recv(&mut buffer) {
        Ok(len) => len,
        Err(e) => {
            eprintln!("\nNo response: {}", e);
            std::process::exit(1);
        }
    };
    let reply = Packet::decode(&buffer[..len])?;
    println!("Received {:?} ({} bytes)", reply.code, len);

    if reply.code != Code::AccessAccept {
        std::process::exit(1);
    }

    let Some(success) = reply.find_vendor_attribute(
        MICROSOFT_VENDOR_ID,
        MicrosoftAttributeType::Chap2Success.as_u8(),
    ) else {
        println!("  No MS-CHAP2-Success attribute");
        return Ok(());
    };

    let success = MsChap2Success::from_bytes(&success.value)?;
    let genuine = check_authenticator_response(
        &success.authenticator_response,
        password,
        &nt_response,
        &peer_challenge,
        &auth_challenge,
        username,
    )?;
    if genuine {
        println!("  Server authenticator response verified");
    } else {
        println!("  Server authenticator response does NOT match");
        std::process::exit(1);
    }

    Ok(())
}
