use chadmeet_client::reconcile::{Slot, TileView, TrackReconciler};
use chadmeet_client::replay::{
    HeadlessElement, HeadlessFactory, ScriptEvent, ScriptedRoom, parse_script,
};
use chadmeet_client::room::{RoomExit, RoomView};
use chadmeet_client::sdk::{ElementKind, MediaTrack, RoomSession};
use chadmeet_protocol::TrackSource;

const CALL: &str = r#"
{"event":"participant_connected","identity":"bob-1","name":"bob"}
{"event":"track_published","identity":"bob-1","sid":"TR_bobcam","source":"camera"}
{"event":"track_subscribed","identity":"bob-1","sid":"TR_bobcam"}
{"event":"track_published","identity":"bob-1","sid":"TR_bobmic","source":"microphone"}
{"event":"track_subscribed","identity":"bob-1","sid":"TR_bobmic"}
{"event":"active_speakers","identities":["bob-1"]}
{"event":"data","from":"bob-1","payload":"{\"type\":\"chat\",\"message\":\"can you hear me?\"}"}
"#;

async fn play(room: &ScriptedRoom, script: &str) {
    room.play(parse_script(script).unwrap()).await.unwrap();
}

#[tokio::test]
async fn participant_without_tracks_shows_avatar() {
    let (room, _events) = ScriptedRoom::new("me", "Me");
    play(
        &room,
        r#"{"event":"participant_connected","identity":"carol-7","name":"carol"}"#,
    )
    .await;

    let mut tiles = TrackReconciler::new(HeadlessFactory);
    tiles.reconcile(&room.participants());

    assert_eq!(tiles.view("carol-7"), Some(TileView::Avatar { initial: 'C' }));
    assert_eq!(tiles.view("me"), Some(TileView::Avatar { initial: 'M' }));
}

#[tokio::test]
async fn camera_publication_switches_tile_to_camera() {
    let (room, mut events) = ScriptedRoom::new("me", "Me");
    let mut tiles = TrackReconciler::new(HeadlessFactory);

    play(
        &room,
        r#"{"event":"participant_connected","identity":"bob-1","name":"bob"}"#,
    )
    .await;
    events.recv().await.unwrap();
    tiles.reconcile(&room.participants());
    assert_eq!(tiles.view("bob-1"), Some(TileView::Avatar { initial: 'B' }));

    play(
        &room,
        r#"{"event":"track_published","identity":"bob-1","sid":"TR_bobcam","source":"camera"}"#,
    )
    .await;
    events.recv().await.unwrap();
    tiles.reconcile(&room.participants());
    assert_eq!(
        tiles.view("bob-1"),
        Some(TileView::Avatar { initial: 'B' }),
        "published but not yet subscribed"
    );

    play(
        &room,
        r#"{"event":"track_subscribed","identity":"bob-1","sid":"TR_bobcam"}"#,
    )
    .await;
    events.recv().await.unwrap();
    tiles.reconcile(&room.participants());
    assert_eq!(tiles.view("bob-1"), Some(TileView::Camera));
    assert_eq!(
        tiles.element("bob-1", Slot::Camera).unwrap().bound_track(),
        Some("TR_bobcam")
    );
}

#[tokio::test]
async fn full_call_reaches_chat_and_ends_on_disconnect() {
    let (room, events) = ScriptedRoom::new("me", "Me");
    play(&room, CALL).await;
    play(&room, r#"{"event":"disconnected","reason":"room closed"}"#).await;

    let mut view = RoomView::new(HeadlessFactory);
    let exit = view.run(&room, events, std::future::pending()).await;

    assert_eq!(
        exit,
        RoomExit::Disconnected {
            reason: "room closed".to_string()
        }
    );
    let chat = view.chat().entries();
    assert_eq!(chat.len(), 1);
    assert_eq!(chat[0].from, "bob");
    assert_eq!(chat[0].message, "can you hear me?");
}

#[tokio::test]
async fn leaving_stops_every_local_device() {
    let (room, events) = ScriptedRoom::new("me", "Me");
    room.set_camera_enabled(true).await.unwrap();
    room.set_microphone_enabled(true).await.unwrap();
    room.set_screen_share_enabled(true).await.unwrap();
    let local = room.local_tracks();
    assert_eq!(local.len(), 3);

    let mut view = RoomView::new(HeadlessFactory);
    let exit = view.run(&room, events, async {}).await;
    assert_eq!(exit, RoomExit::Left);
    assert!(!room.is_connected());

    for track in local {
        let mut element = HeadlessElement::new(ElementKind::Video);
        assert!(
            track.attach(&mut element).is_err(),
            "track {} still live after leaving",
            track.sid()
        );
    }
}

#[tokio::test]
async fn devices_enabled_just_before_leaving_are_stopped() {
    let (room, events) = ScriptedRoom::new("me", "Me");
    let peer = room.clone();

    let mut view = RoomView::new(HeadlessFactory);
    let exit = view
        .run(&room, events, async move {
            peer.set_camera_enabled(true).await.unwrap();
            peer.set_microphone_enabled(true).await.unwrap();
        })
        .await;
    assert_eq!(exit, RoomExit::Left);

    let local = room.local_tracks();
    assert_eq!(local.len(), 2);
    for track in local {
        let mut element = HeadlessElement::new(ElementKind::Video);
        assert!(
            track.attach(&mut element).is_err(),
            "track {} still live after leaving",
            track.sid()
        );
    }
}

#[tokio::test]
async fn chat_and_controls_work_during_call() {
    let (room, events) = ScriptedRoom::new("me", "Me");
    let peer = room.clone();
    let script = parse_script(CALL).unwrap();

    let mut view = RoomView::new(HeadlessFactory);
    let handle = view.handle();
    let exit = view
        .run(&room, events, async move {
            peer.play(script).await.unwrap();
            handle.send_chat("loud and clear").await.unwrap();
            handle.toggle_camera().await.unwrap();
            handle.toggle_microphone().await.unwrap();

            // Wait for the loop to apply the commands, then end the call.
            while !peer.local_participant().is_enabled(TrackSource::Microphone) {
                tokio::task::yield_now().await;
            }
            peer.apply(ScriptEvent::Disconnected {
                reason: "room closed".to_string(),
            })
            .await
            .unwrap();
            std::future::pending::<()>().await;
        })
        .await;

    assert_eq!(
        exit,
        RoomExit::Disconnected {
            reason: "room closed".to_string()
        }
    );
    assert_eq!(
        room.sent_payloads(),
        vec![br#"{"type":"chat","message":"loud and clear"}"#.to_vec()]
    );

    let chat = view.chat().entries();
    assert_eq!(chat.len(), 2);
    assert!(chat.iter().any(|e| e.from == "You" && e.message == "loud and clear"));
    assert!(chat.iter().any(|e| e.from == "bob" && e.message == "can you hear me?"));

    let controls = view.controls();
    assert!(controls.camera);
    assert!(controls.microphone);
    assert!(!controls.screen_share);
}
