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

//! Organizations, memberships & users-- the entities with no uniqueness hazard, and their
//! cascades.

use forecourt::{entities::UserId, orgs::OrganizationUpdate, users::UserUpdate};
use forecourt_test::{new_org_member, new_organization, new_user, Fixture};

#[tokio::test]
async fn organization_crud() {
    let Fixture { fc, .. } = Fixture::new();
    let org = fc.create_organization(new_organization("acme")).await.unwrap();
    let got = fc.get_organization(&org.org_id).await.unwrap().unwrap();
    assert_eq!(got, org);

    let updated = fc
        .update_organization(
            &org.org_id,
            OrganizationUpdate {
                name: Some("acme-renamed".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "acme-renamed");

    assert!(fc
        .update_organization(
            &forecourt::entities::OrgId::new(),
            OrganizationUpdate::default()
        )
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn membership_crud_and_cascade() {
    let Fixture { fc, .. } = Fixture::new();
    let org = fc.create_organization(new_organization("acme")).await.unwrap();
    let users: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
    for user_id in &users {
        fc.create_org_member(new_org_member(&org.org_id, user_id, "contributor"))
            .await
            .unwrap();
    }

    assert_eq!(fc.list_org_members(&org.org_id).await.unwrap().len(), 3);
    let promoted = fc
        .update_org_member(&org.org_id, &users[0], "admin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promoted.role, "admin");

    fc.delete_org_member(&org.org_id, &users[2]).await.unwrap();
    assert_eq!(fc.list_org_members(&org.org_id).await.unwrap().len(), 2);

    // Delete the rest in one cascade; idempotently.
    fc.delete_org_members(&org.org_id).await.unwrap();
    fc.delete_org_members(&org.org_id).await.unwrap();
    assert!(fc.list_org_members(&org.org_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_user_orgs_overlays_roles_and_drops_terminated() {
    let Fixture { fc, .. } = Fixture::new();
    let user_id = UserId::new();
    let active = fc.create_organization(new_organization("active")).await.unwrap();
    let mut dead = new_organization("dead");
    dead.terminated = true;
    let dead = fc.create_organization(dead).await.unwrap();
    fc.create_org_member(new_org_member(&active.org_id, &user_id, "admin"))
        .await
        .unwrap();
    fc.create_org_member(new_org_member(&dead.org_id, &user_id, "contributor"))
        .await
        .unwrap();

    let memberships = fc.list_user_orgs(&user_id).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].organization.org_id, active.org_id);
    assert_eq!(memberships[0].role, "admin");
}

#[tokio::test]
async fn user_crud_and_provider_lookup() {
    let Fixture { fc, .. } = Fixture::new();
    let user = fc.create_user(new_user("12345")).await.unwrap();

    let found = fc.find_user("12345", "github").await.unwrap().unwrap();
    assert_eq!(found.user_id, user.user_id);
    // Same provider id under a different provider is a different identity.
    assert!(fc.find_user("12345", "bitbucket").await.unwrap().is_none());

    let updated = fc
        .update_user(
            &user.user_id,
            UserUpdate {
                email: Some("someone@example.com".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.email.as_deref(), Some("someone@example.com"));

    let infos = fc
        .get_user_info(&[user.user_id, UserId::new()])
        .await
        .unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(
        infos[&user.user_id].username.as_deref(),
        Some("user-12345")
    );
}

#[tokio::test]
async fn delete_user_cascades_over_memberships() {
    let Fixture { fc, .. } = Fixture::new();
    let user = fc.create_user(new_user("67890")).await.unwrap();
    let org_a = fc.create_organization(new_organization("a")).await.unwrap();
    let org_b = fc.create_organization(new_organization("b")).await.unwrap();
    fc.create_org_member(new_org_member(&org_a.org_id, &user.user_id, "admin"))
        .await
        .unwrap();
    fc.create_org_member(new_org_member(&org_b.org_id, &user.user_id, "contributor"))
        .await
        .unwrap();

    fc.delete_user(&user.user_id).await.unwrap();

    assert!(fc.get_user(&user.user_id).await.unwrap().is_none());
    assert!(fc
        .get_org_member(&org_a.org_id, &user.user_id)
        .await
        .unwrap()
        .is_none());
    assert!(fc
        .get_org_member(&org_b.org_id, &user.user_id)
        .await
        .unwrap()
        .is_none());
    // And again; nothing to do; fine.
    fc.delete_user(&user.user_id).await.unwrap();
}
