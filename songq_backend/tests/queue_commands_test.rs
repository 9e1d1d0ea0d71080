use std::time::Duration;

use tempfile::tempdir;

use api_models::settings::{PlayerSettings, QueueSettings};
use songq::command_handler::{handle_queue_command, QueueCommand};
use songq::player;
use songq_store::Queue;

fn open_queue(dir: &tempfile::TempDir) -> Queue {
    Queue::open(&QueueSettings {
        db_path: dir.path().join("queue.db").to_str().unwrap().to_string(),
        ..Default::default()
    })
    .unwrap()
}

fn enqueue(title: &str, user: &str, admin: bool) -> QueueCommand {
    QueueCommand::Enqueue {
        title: title.to_string(),
        user_id: user.to_string(),
        song_url: format!("https://example.invalid/{title}"),
        thumbnail_url: String::new(),
        duration_secs: 0,
        admin,
    }
}

fn listed_titles(queue: &Queue) -> Vec<String> {
    let out = handle_queue_command(queue, 0, QueueCommand::List { offset: 0, limit: 25 }).unwrap();
    out["songs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn enqueue_respects_user_limit_unless_admin() {
    let dir = tempdir().unwrap();
    let queue = open_queue(&dir);

    handle_queue_command(&queue, 1, enqueue("first", "alice", false)).unwrap();
    assert!(handle_queue_command(&queue, 1, enqueue("second", "alice", false)).is_err());
    handle_queue_command(&queue, 1, enqueue("other", "bob", false)).unwrap();
    handle_queue_command(&queue, 1, enqueue("forced", "alice", true)).unwrap();
    assert_eq!(listed_titles(&queue), vec!["first", "other", "forced"]);

    // a played song no longer counts against the limit
    handle_queue_command(&queue, 1, QueueCommand::Dequeue).unwrap();
    handle_queue_command(&queue, 0, QueueCommand::Remove { id: 2 }).unwrap();
    handle_queue_command(&queue, 1, enqueue("again", "alice", false)).unwrap();
    assert_eq!(listed_titles(&queue), vec!["other", "again"]);
}

#[test]
fn move_uses_one_based_positions() {
    let dir = tempdir().unwrap();
    let queue = open_queue(&dir);
    for title in ["a", "b", "c", "d"] {
        handle_queue_command(&queue, 0, enqueue(title, "u", false)).unwrap();
    }

    let moved = handle_queue_command(&queue, 0, QueueCommand::Move { id: 3, position: 1 }).unwrap();
    assert_eq!(moved["title"], "d");
    assert_eq!(moved["id"], 0);
    assert_eq!(listed_titles(&queue), vec!["d", "a", "b", "c"]);

    assert!(handle_queue_command(&queue, 0, QueueCommand::Move { id: 0, position: 0 }).is_err());
    assert!(handle_queue_command(&queue, 0, QueueCommand::Move { id: 0, position: 5 }).is_err());
}

#[test]
fn find_update_last_and_stats() {
    let dir = tempdir().unwrap();
    let queue = open_queue(&dir);
    let queued = handle_queue_command(&queue, 0, enqueue("song", "carol", false)).unwrap();
    let slug = queued["slug"].as_str().unwrap().to_string();

    let found = handle_queue_command(&queue, 0, QueueCommand::Find { key: slug.clone() }).unwrap();
    assert_eq!(found["id"], 0);
    let found = handle_queue_command(&queue, 0, QueueCommand::Find { key: "0".to_string() }).unwrap();
    assert_eq!(found["slug"], slug.as_str());

    let updated = handle_queue_command(
        &queue,
        0,
        QueueCommand::Update {
            id: 0,
            title: Some("renamed".to_string()),
            song_url: None,
            thumbnail_url: None,
        },
    )
    .unwrap();
    assert_eq!(updated["title"], "renamed");
    assert_eq!(updated["song_url"], "https://example.invalid/song");

    assert!(handle_queue_command(&queue, 0, QueueCommand::Last).is_err());
    handle_queue_command(&queue, 0, QueueCommand::Dequeue).unwrap();
    let last = handle_queue_command(&queue, 0, QueueCommand::Last).unwrap();
    assert_eq!(last["title"], "renamed");
    assert!(last.get("dequeued_at").is_some());

    let stats = handle_queue_command(
        &queue,
        0,
        QueueCommand::Stats {
            user_id: "carol".to_string(),
        },
    )
    .unwrap();
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["stats"]["queued_count"], 1);
    assert_eq!(stats["stats"]["dequeued_count"], 1);

    handle_queue_command(&queue, 0, QueueCommand::Gc).unwrap();
}

#[tokio::test]
async fn player_consumes_queue_until_stopped() {
    let dir = tempdir().unwrap();
    let queue = open_queue(&dir);
    for title in ["one", "two"] {
        handle_queue_command(&queue, 0, enqueue(title, "u", false)).unwrap();
    }
    let settings = PlayerSettings {
        poll_interval_ms: 5,
        playback_delay_secs: 0,
    };
    let played = player::play(&queue, &settings, tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(played, 2);
    assert!(handle_queue_command(&queue, 0, QueueCommand::Peek).is_err());
    let last = handle_queue_command(&queue, 0, QueueCommand::Last).unwrap();
    assert_eq!(last["title"], "two");
}
