use async_std::net::TcpListener;
use async_std::task;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use shopsync_client::RealtimeTransport;
use shopsync_common::{AuthToken, ChannelId, ClientEvent, ServerEvent, Session, UserId};
use shopsync_websockets::{WebSocketSettings, WebSocketTransport};

const PUSH: &str = r#"[
    {"event":"subscribed","data":{"channelIds":["c1"]}},
    {"event":"typing","data":{"channelId":"c1"}},
    {"event":"new_message","data":{"channelId":"c1","message":{"senderId":"u2","text":"hi"}}}
]"#;

#[test]
fn subscribe_and_receive_a_batched_push() {
    task::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = task::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (auth_tx, auth_rx) = oneshot::channel();
            let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let header = request
                    .headers()
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                let _ = auth_tx.send(header);
                Ok(response)
            };
            let mut ws = async_tungstenite::accept_hdr_async(stream, callback).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            ws.send(Message::text(PUSH)).await.unwrap();
            ws.close(None).await.unwrap();

            let subscribe = first.to_text().unwrap().to_owned();
            (auth_rx.await.unwrap(), subscribe)
        });

        let session = Session::new("u1", AuthToken::new("secret"), "Ada");
        let transport =
            WebSocketTransport::parse(&format!("ws://{}/chat", addr), WebSocketSettings::default()).unwrap();
        let mut connection = transport.connect(&session).await.unwrap();

        connection
            .sink
            .send(&ClientEvent::Subscribe {
                user_id: UserId::new("u1"),
            })
            .await
            .unwrap();

        let events = connection.source.recv().await.unwrap().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ServerEvent::Subscribed {
                channel_ids: vec![ChannelId::new("c1")]
            }
        );
        assert!(matches!(&events[1], ServerEvent::NewMessage { message, .. } if message.sender_id == UserId::new("u2")));

        assert!(connection.source.recv().await.is_none());

        let (auth, subscribe) = server.await;
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(subscribe, r#"{"event":"subscribe","data":{"userId":"u1"}}"#);
    });
}
