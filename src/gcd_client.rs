//! HOWDY client: the one piece of GCD interaction this node owns (the GCD
//! server itself is an external collaborator, out of scope — spec.md §1).

use crate::error::NodeError;
use crate::identity::{Identity, ListenAddress};
use crate::message::{read_frame, write_frame, InboundMessage, MembershipPayload, Reply};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Send `("HOWDY", (identity, listen_address))` to the GCD and return the
/// membership mapping it replies with.
pub async fn howdy(
    gcd: SocketAddr,
    identity: Identity,
    listen_addr: ListenAddress,
) -> Result<MembershipPayload, NodeError> {
    let mut stream = TcpStream::connect(gcd)
        .await
        .map_err(|source| NodeError::GcdUnreachable { gcd, source })?;

    write_frame(
        &mut stream,
        &InboundMessage::Howdy {
            identity,
            listen_addr,
        },
    )
    .await?;

    let reply: Reply = read_frame(&mut stream).await?;
    match reply {
        Reply::Membership(members) => Ok(members),
        Reply::GotIt(_) => Err(NodeError::Decode {
            peer: gcd,
            reason: "GCD replied GOT_IT instead of a membership mapping".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn howdy_returns_the_membership_mapping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gcd_addr = listener.local_addr().unwrap();
        let peer_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _req: InboundMessage = read_frame(&mut stream).await.unwrap();
            let mut members = HashMap::new();
            members.insert(ListenAddress::new(peer_addr), Identity::new(10, 100));
            write_frame(&mut stream, &Reply::Membership(members))
                .await
                .unwrap();
        });

        let self_addr: SocketAddr = "127.0.0.1:2".parse().unwrap();
        let members = howdy(gcd_addr, Identity::new(5, 1), ListenAddress::new(self_addr))
            .await
            .unwrap();
        assert_eq!(
            members.get(&ListenAddress::new(peer_addr)),
            Some(&Identity::new(10, 100))
        );
    }

    #[tokio::test]
    async fn howdy_fails_fast_when_gcd_unreachable() {
        let gcd: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let self_addr: SocketAddr = "127.0.0.1:2".parse().unwrap();
        let result = howdy(gcd, Identity::new(5, 1), ListenAddress::new(self_addr)).await;
        assert!(matches!(result, Err(NodeError::GcdUnreachable { .. })));
    }
}
