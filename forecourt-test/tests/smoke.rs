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

//! Application lifecycle, end-to-end.

use forecourt::{apps, entities::AppSlug};
use forecourt_test::{new_application, Fixture};

/// The whole story in one test: create with a custom domain pair, look up three ways, collide on
/// both name & domain pair, delete, observe everything cleaned up.
#[tokio::test]
async fn application_lifecycle() {
    let Fixture { fc, .. } = Fixture::new();

    let mut new = new_application("foo");
    new.domain_name = Some("foo.com".to_owned());
    new.sub_domain = Some("www".to_owned());
    let app_id = new.app_id;

    let created = fc.create_application(new.clone()).await.unwrap();
    assert_eq!(created.name, AppSlug::new("foo").unwrap());
    assert_eq!(created.app.domain_name.as_deref(), Some("foo.com"));

    // Look it up by id & by name; both return the merged view.
    let by_id = fc.get_application(&app_id).await.unwrap().unwrap();
    assert_eq!(by_id.app.app_id, app_id);
    assert_eq!(by_id.name.as_ref(), "foo");
    let by_name = fc
        .get_application_by_name(&AppSlug::new("foo").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.app.app_id, app_id);
    let by_domain = fc
        .get_app_by_domain_name("foo.com", "www")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_domain.app.app_id, app_id);

    // A second application may claim neither the name...
    let err = fc
        .create_application(new_application("foo"))
        .await
        .unwrap_err();
    assert!(matches!(err, apps::Error::AppNameExists { .. }));

    // ...nor the (domainName, subDomain) pair.
    let mut rival = new_application("bar");
    rival.domain_name = Some("foo.com".to_owned());
    rival.sub_domain = Some("www".to_owned());
    let err = fc.create_application(rival).await.unwrap_err();
    assert!(matches!(err, apps::Error::DomainNameTaken { .. }));

    // Delete; the record and the name binding both go.
    fc.delete_application(&app_id).await.unwrap();
    assert!(fc.get_application(&app_id).await.unwrap().is_none());
    assert!(fc
        .get_application_by_name(&AppSlug::new("foo").unwrap())
        .await
        .unwrap()
        .is_none());

    // And the name is claimable again.
    fc.create_application(new_application("foo")).await.unwrap();
}

#[tokio::test]
async fn get_nonexistent_application() {
    let Fixture { fc, .. } = Fixture::new();
    assert!(fc
        .get_application(&forecourt::entities::AppId::new())
        .await
        .unwrap()
        .is_none());
    assert!(fc
        .get_application_by_name(&AppSlug::new("nope").unwrap())
        .await
        .unwrap()
        .is_none());
    assert!(fc
        .get_app_by_domain_name("nope.com", "www")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_application_record() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("quux");
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();

    let updated = fc
        .update_application(
            &app_id,
            apps::ApplicationUpdate {
                ssl_required: Some(true),
                traffic_control_enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.app.ssl_required);
    assert!(updated.app.traffic_control_enabled);
    // The name was untouched.
    assert_eq!(updated.name.as_ref(), "quux");

    // Updating an application that isn't there is None, not an upsert.
    assert!(fc
        .update_application(
            &forecourt::entities::AppId::new(),
            apps::ApplicationUpdate::default()
        )
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn transfer_application_moves_org_and_nothing_else() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("mover");
    let app_id = new.app_id;
    let old_org = new.org_id;
    fc.create_application(new).await.unwrap();

    let new_org = forecourt::entities::OrgId::new();
    let app = fc
        .transfer_application(&app_id, &new_org)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.org_id, new_org);
    assert_ne!(app.org_id, old_org);
    // Still reachable under its name; nothing else was touched.
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    assert_eq!(view.name.as_ref(), "mover");
}

#[tokio::test]
async fn traffic_rules_update_in_place() {
    let Fixture { fc, .. } = Fixture::new();
    let new = new_application("rules");
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();

    let version_id = forecourt::entities::VersionId::new();
    let rules = vec![forecourt::entities::TrafficRule {
        version_id,
        rule: "*".to_owned(),
    }];
    let app = fc
        .update_traffic_rules(&app_id, "production", &rules)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.traffic_rules.get("production").unwrap(), &rules);

    // Replacing one environment's rules leaves the others alone.
    let staging = vec![forecourt::entities::TrafficRule {
        version_id: forecourt::entities::VersionId::new(),
        rule: "0.5".to_owned(),
    }];
    let app = fc
        .update_traffic_rules(&app_id, "staging", &staging)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.traffic_rules.get("production").unwrap(), &rules);
    assert_eq!(app.traffic_rules.get("staging").unwrap(), &staging);
}
