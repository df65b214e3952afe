//! Scripted server side for integration tests

#![allow(dead_code)]

use llm_stream::codec::FrameReader;
use llm_stream::envelope::{Envelope, FRESH_SESSION, INIT_ENGINE};
use llm_stream::transport::{MemoryServer, ServerStream};
use llm_stream::SessionConfig;

pub const ENGINE: &str = "llm";
pub const USER_CODE: &str = "user-1";

pub fn config() -> SessionConfig {
    SessionConfig::new(ENGINE, USER_CODE)
}

/// Server half of one session
pub struct RemoteSession {
    pub main: ServerStream,
    pub heartbeat: ServerStream,
    /// Token presented in the handshake
    pub token: String,
    /// User code carried by the init envelope
    pub user_code: String,
}

/// Accept one session and answer its handshake with `status`, then its init
pub async fn accept_session(server: &mut MemoryServer, status: &str) -> RemoteSession {
    let mut main = server.accept().await.expect("main stream");
    let mut heartbeat = server.accept().await.expect("heartbeat stream");

    let hello = main.recv().await.expect("handshake");
    assert_eq!(hello.kind(), ENGINE);
    let token = String::from_utf8(hello.payload().to_vec()).expect("utf-8 token");
    assert!(main.send(Envelope::new(status, "")).await);

    let beat = heartbeat.recv().await.expect("first heartbeat");
    assert!(beat.is_heartbeat());
    assert_eq!(&beat.payload()[..], token.as_bytes());

    let init = main.recv().await.expect("init");
    assert_eq!(init.kind(), INIT_ENGINE);
    let user_code = FrameReader::new(init.payload())
        .read_str()
        .expect("init payload")
        .expect("user code present")
        .to_string();
    assert!(main.send(Envelope::new(INIT_ENGINE, "")).await);

    RemoteSession {
        main,
        heartbeat,
        token,
        user_code,
    }
}

pub async fn accept_fresh(server: &mut MemoryServer) -> RemoteSession {
    accept_session(server, FRESH_SESSION).await
}

/// Accept sessions forever without answering any request
pub async fn serve_silently(mut server: MemoryServer) {
    let mut sessions = Vec::new();
    loop {
        sessions.push(accept_fresh(&mut server).await);
    }
}
