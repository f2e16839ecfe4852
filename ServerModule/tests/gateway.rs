//! Session gateway routing: replies go to the sender only, mutations fan out
//! to every open observer, and new observers start from a full snapshot.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use tabletop_server::command;
use tabletop_server::connection::handlers::greet;
use tabletop_server::{SceneContext, ServerConfig};

fn next(outbox: &mut UnboundedReceiver<String>) -> Option<Value> {
    outbox.try_recv().ok().map(|text| serde_json::from_str(&text).unwrap())
}

async fn connect(ctx: &SceneContext) -> (u64, UnboundedReceiver<String>) {
    let (id, outbox) = ctx.broadcaster().register();
    assert!(greet(ctx, id).await);
    (id, outbox)
}

#[tokio::test]
async fn first_message_is_full_snapshot() {
    let ctx = SceneContext::new(ServerConfig::default());
    command::execute(&ctx, 0, r#"{"action": "create_entity", "data": {"name": "cube_1"}}"#).await;

    let (_id, mut outbox) = connect(&ctx).await;
    let first = next(&mut outbox).unwrap();
    assert_eq!(first["type"], "game_state");
    assert!(first["data"]["entities"]["cube_1"].is_object());
    assert!(first["timestamp"].is_i64());
}

#[tokio::test]
async fn unknown_action_errors_only_to_sender() {
    let ctx = SceneContext::new(ServerConfig::default());
    let (sender, mut sender_box) = connect(&ctx).await;
    let (_other, mut other_box) = connect(&ctx).await;
    next(&mut sender_box);
    next(&mut other_box);

    command::execute(&ctx, sender, r#"{"action": "summon_dragon", "data": {}}"#).await;

    let reply = next(&mut sender_box).unwrap();
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["action"], "summon_dragon");
    assert!(next(&mut other_box).is_none());
}

#[tokio::test]
async fn malformed_envelope_errors_only_to_sender() {
    let ctx = SceneContext::new(ServerConfig::default());
    let (sender, mut sender_box) = connect(&ctx).await;
    let (_other, mut other_box) = connect(&ctx).await;
    next(&mut sender_box);
    next(&mut other_box);

    command::execute(&ctx, sender, "not json").await;

    assert_eq!(next(&mut sender_box).unwrap()["type"], "error");
    assert!(next(&mut other_box).is_none());
}

#[tokio::test]
async fn mutations_fan_out_to_every_observer() {
    let ctx = SceneContext::new(ServerConfig::default());
    let (sender, mut sender_box) = connect(&ctx).await;
    let (_other, mut other_box) = connect(&ctx).await;
    next(&mut sender_box);
    next(&mut other_box);

    command::execute(
        &ctx,
        sender,
        r#"{"action": "create_entity", "data": {"name": "mini_1", "template": "warrior", "position": [1, 0, 1]}}"#,
    )
    .await;

    for outbox in [&mut sender_box, &mut other_box] {
        let update = next(outbox).unwrap();
        assert_eq!(update["type"], "game_state_update");
        let mini = &update["data"]["entities"]["mini_1"];
        assert_eq!(mini["collisionBox"]["height"], 1.2);
        assert_eq!(mini["source"], "command");
    }
}

#[tokio::test]
async fn closed_observer_does_not_block_others() {
    let ctx = SceneContext::new(ServerConfig::default());
    let (sender, mut sender_box) = connect(&ctx).await;
    let (_gone, gone_box) = connect(&ctx).await;
    let (_other, mut other_box) = connect(&ctx).await;
    drop(gone_box);
    next(&mut sender_box);
    next(&mut other_box);

    command::execute(
        &ctx,
        sender,
        r#"{"action": "set_camera", "data": {"position": [0, 15, 15], "target": [0, 0, 0]}}"#,
    )
    .await;

    assert_eq!(next(&mut sender_box).unwrap()["type"], "camera_update");
    assert_eq!(next(&mut other_box).unwrap()["type"], "camera_update");
    assert_eq!(ctx.broadcaster().open_count(), 2);
}

/// Last full scene an observer was sent, whether snapshot or update
fn last_full_state(outbox: &mut UnboundedReceiver<String>) -> Option<Value> {
    let mut last = None;
    while let Some(message) = next(outbox) {
        if message["type"] == "game_state" || message["type"] == "game_state_update" {
            last = Some(message["data"].clone());
        }
    }
    last
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_reach_observers_in_commit_order() {
    let ctx = Arc::new(SceneContext::new(ServerConfig::default()));
    command::execute(&ctx, 0, r#"{"action": "create_entity", "data": {"name": "cube_1", "template": "cube"}}"#).await;
    let (_id, mut outbox) = connect(&ctx).await;

    for round in 0..50 {
        let moves: Vec<_> = (0..16)
            .map(|step| {
                let ctx = Arc::clone(&ctx);
                let text = json!({"action": "move_entity", "data": {"name": "cube_1", "to": [step, 0.5, round % 5]}})
                    .to_string();
                tokio::spawn(async move { command::execute(&ctx, 0, &text).await })
            })
            .collect();
        for task in moves {
            task.await.unwrap();
        }

        let seen = last_full_state(&mut outbox).unwrap();
        let stored = ctx.store().lock().await.get("cube_1").unwrap().position;
        assert_eq!(seen["entities"]["cube_1"]["position"], json!(stored), "round {}", round);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn observer_joining_mid_burst_misses_nothing() {
    let ctx = Arc::new(SceneContext::new(ServerConfig::default()));

    let creates: Vec<_> = (0..32)
        .map(|index| {
            let ctx = Arc::clone(&ctx);
            let text = json!({"action": "create_entity", "data": {"name": format!("mini_{}", index)}}).to_string();
            tokio::spawn(async move { command::execute(&ctx, 0, &text).await })
        })
        .collect();
    let (_id, mut outbox) = connect(&ctx).await;
    for task in creates {
        task.await.unwrap();
    }

    let seen = last_full_state(&mut outbox).unwrap();
    let entities = seen["entities"].as_object().unwrap();
    assert_eq!(entities.len(), 32);
    assert_eq!(entities.len(), ctx.store().lock().await.len());
}
