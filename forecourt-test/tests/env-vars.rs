// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of forecourt.
//
// forecourt is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// forecourt is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with forecourt.  If not,
// see <http://www.gnu.org/licenses/>.

//! The nested-map mutation protocol for per-environment variables.

use forecourt::{crypto::PREAMBLE, storage::{Key, KeyValueStore}, tables};
use forecourt_test::{new_application, Fixture};

#[tokio::test]
async fn set_get_overwrite_delete() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("envy");
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();

    // Set into an environment that has never existed; the two-step creates it.
    fc.set_environment_variable(&app_id, "production", "DB_CONNECTION", "connection_string", false)
        .await
        .unwrap();
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    let entry = &view.app.env["production"]["DB_CONNECTION"];
    assert_eq!(entry.value, "connection_string");
    assert!(!entry.encrypted);

    // Overwrite in place.
    fc.set_environment_variable(&app_id, "production", "DB_CONNECTION", "v2", false)
        .await
        .unwrap();
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    assert_eq!(view.app.env["production"]["DB_CONNECTION"].value, "v2");

    // Delete: the key goes, the environment stays (possibly empty).
    fc.delete_environment_variable(&app_id, "production", "DB_CONNECTION")
        .await
        .unwrap();
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    let production = view.app.env.get("production").unwrap();
    assert!(production.get("DB_CONNECTION").is_none());
}

#[tokio::test]
async fn deleting_the_absent_is_a_noop() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("noop");
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();

    // Neither the environment nor the key exists; twice over, still fine, state unchanged.
    fc.delete_environment_variable(&app_id, "production", "KEY")
        .await
        .unwrap();
    fc.delete_environment_variable(&app_id, "production", "KEY")
        .await
        .unwrap();
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    assert!(view.app.env.is_empty());
}

#[tokio::test]
async fn encrypted_variables_round_trip() {
    let fixture = Fixture::with_cipher();
    let new = new_application("sneaky");
    let app_id = new.app_id;
    fixture.fc.create_application(new).await.unwrap();

    fixture
        .fc
        .set_environment_variable(&app_id, "production", "API_KEY", "sensitive_value", true)
        .await
        .unwrap();

    // The caller sees plaintext (and the marker).
    let view = fixture.fc.get_application(&app_id).await.unwrap().unwrap();
    let entry = &view.app.env["production"]["API_KEY"];
    assert_eq!(entry.value, "sensitive_value");
    assert!(entry.encrypted);

    // The *store* holds ciphertext.
    let raw = fixture
        .store
        .get(&tables::APPLICATIONS, Key::hash(app_id.to_string()))
        .await
        .unwrap()
        .unwrap();
    let stored = raw["env"]["production"]["API_KEY"]["value"].as_str().unwrap();
    assert!(stored.starts_with(PREAMBLE));
    assert_ne!(stored, "sensitive_value");
}

#[tokio::test]
async fn encryption_without_a_cipher_is_refused() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("nokey");
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();

    let err = fc
        .set_environment_variable(&app_id, "production", "KEY", "v", true)
        .await
        .unwrap_err();
    assert!(matches!(err, forecourt::env_vars::Error::NoCipher { .. }));
    // And nothing was half-written at the leaf.
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    assert!(view
        .app
        .env
        .get("production")
        .map(|vars| vars.is_empty())
        .unwrap_or(true));
}

#[tokio::test]
async fn key_value_maps() {
    let Fixture { fc, .. } = Fixture::new();

    // First write creates the row; blanks are normalized to nulls on the way in.
    fc.set_key_map_value(
        "app-1-addons",
        "logdrain",
        serde_json::json!({"token": "abc", "comment": ""}),
    )
    .await
    .unwrap();
    let value = fc
        .get_key_map_value("app-1-addons", "logdrain")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, serde_json::json!({"token": "abc", "comment": null}));

    // Other entries don't interfere.
    fc.set_key_map_value("app-1-addons", "cache", serde_json::json!({"size": 64}))
        .await
        .unwrap();
    assert!(fc
        .get_key_map_value("app-1-addons", "logdrain")
        .await
        .unwrap()
        .is_some());

    // Delete one entry; idempotently.
    fc.delete_key_map_key("app-1-addons", "logdrain").await.unwrap();
    fc.delete_key_map_key("app-1-addons", "logdrain").await.unwrap();
    assert!(fc
        .get_key_map_value("app-1-addons", "logdrain")
        .await
        .unwrap()
        .is_none());
    // Deleting from a row that never existed is likewise a no-op.
    fc.delete_key_map_key("no-such-row", "x").await.unwrap();

    // Drop the whole row.
    fc.delete_key_map("app-1-addons").await.unwrap();
    assert!(fc
        .get_key_map_value("app-1-addons", "cache")
        .await
        .unwrap()
        .is_none());
}
