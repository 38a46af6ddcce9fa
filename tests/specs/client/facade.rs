// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed client facade against the fake vault.

use std::time::Duration;

use sv_client::{ApiClient, ClientError, RemoteApi, RemoteEvent};

use crate::prelude::*;

async fn client() -> (FakeVault, ApiClient) {
    let vault = FakeVault::spawn().await;
    let client = ApiClient::new(vault.url(), "spec-token").expect("client");
    (vault, client)
}

#[tokio::test]
async fn health_and_identity() {
    let (_vault, client) = client().await;
    assert!(RemoteApi::health(&client).await);
    let me = client.me().await.expect("me");
    assert_eq!(me.username, "alice");
}

#[tokio::test]
async fn health_is_false_when_nothing_listens() {
    let client = ApiClient::new("http://127.0.0.1:1/", "t").expect("client");
    assert!(!RemoteApi::health(&client).await);
}

#[tokio::test]
async fn signup_contributors_and_invites() {
    let (_vault, client) = client().await;

    let created = client.signup("carol", Some("inv-123")).await.expect("signup");
    assert_eq!(created.username, "carol");

    let contributors = client.list_contributors().await.expect("contributors");
    let names: Vec<&str> = contributors.iter().map(|c| c.username.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);

    client.delete_contributor("bob").await.expect("delete contributor");
    let err = client.delete_contributor("ghost").await.expect_err("404");
    assert!(matches!(err, ClientError::Api { status: 404, .. }));

    let invite = client.create_invite().await.expect("invite");
    assert_eq!(invite.code, "inv-123");
}

#[tokio::test]
async fn file_round_trip_over_http() {
    let (vault, client) = client().await;
    let origin = sv_client::Origin {
        ctime: Some("2024-01-01T00:00:00Z".into()),
        mtime: Some("2024-01-02T00:00:00Z".into()),
    };
    client
        .put_file("alice", "notes/a note.md", b"# Note\n", &origin)
        .await
        .expect("put");
    // The vault decoded the percent-encoded segment.
    assert_eq!(vault.content("notes/a note.md").as_deref(), Some("# Note\n"));

    let listing = client.list_files("notes/").await.expect("list");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].path, "notes/a note.md");
    assert!(listing[0].origin_mtime.is_some(), "origin header round-tripped");

    let body = client.get_file("alice", "notes/a note.md").await.expect("get");
    assert_eq!(body, "# Note\n");

    client.delete_file("alice", "notes/a note.md").await.expect("delete");
    let err = client.get_file("alice", "notes/a note.md").await.expect_err("gone");
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such file", "error body message surfaced");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_surfaces_only_file_events() {
    let (_vault, client) = client().await;
    let mut subscription = client.subscribe().expect("subscribe");

    let first = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("first event in time")
        .expect("stream open");
    match first {
        RemoteEvent::FileUpdated(ev) => {
            assert_eq!(ev.path, "notes/a.md");
            assert_eq!(ev.contributor, "alice");
        }
        other => panic!("connected/activity must be discarded, got {other:?}"),
    }

    let second = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("second event in time")
        .expect("stream open");
    assert!(matches!(second, RemoteEvent::FileDeleted(ev) if ev.path == "notes/b.md"));

    subscription.close();
}
