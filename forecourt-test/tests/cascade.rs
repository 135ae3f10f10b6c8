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

//! Cascading deletes & detaches: completeness, idempotence, ordering.

use forecourt::entities::VersionStatus;
use forecourt_test::{
    new_application, new_certificate, new_domain, new_version, Fixture,
};

/// After deleting an application: versions gone, name gone, domains *detached* & retained.
#[tokio::test]
async fn delete_application_cascades_completely() {
    let Fixture { fc, .. } = Fixture::new();
    let mut new = new_application("doomed");
    new.domains = vec!["kept.example.com".to_owned()];
    let app_id = new.app_id;
    fc.create_application(new).await.unwrap();
    let v1 = fc
        .create_version(new_version(&app_id, 1, VersionStatus::Complete))
        .await
        .unwrap();
    let v2 = fc
        .create_version(new_version(&app_id, 2, VersionStatus::Complete))
        .await
        .unwrap();

    fc.delete_application(&app_id).await.unwrap();

    assert!(fc.get_application(&app_id).await.unwrap().is_none());
    assert!(fc.get_version(&app_id, &v1.version_id).await.unwrap().is_none());
    assert!(fc.get_version(&app_id, &v2.version_id).await.unwrap().is_none());
    // The domain survives, ownerless-- the org may re-assign it.
    let domain = fc.get_domain("kept.example.com").await.unwrap().unwrap();
    assert!(domain.app_id.is_none());

    // Deletion is idempotent: the second call finds nothing to do and succeeds.
    fc.delete_application(&app_id).await.unwrap();
}

/// Deleting a domain clears the (domainName, subDomain) pair on applications pointing at it.
#[tokio::test]
async fn delete_domain_detaches_applications() {
    let Fixture { fc, .. } = Fixture::new();
    let mut new = new_application("homepage");
    new.domain_name = Some("corp.example.com".to_owned());
    new.sub_domain = Some("www".to_owned());
    let app_id = new.app_id;
    let org_id = new.org_id;
    fc.create_application(new).await.unwrap();
    fc.create_domain(new_domain("corp.example.com", Some(org_id)))
        .await
        .unwrap();

    fc.delete_domain(&org_id, "corp.example.com").await.unwrap();

    assert!(fc.get_domain("corp.example.com").await.unwrap().is_none());
    let view = fc.get_application(&app_id).await.unwrap().unwrap();
    assert!(view.app.domain_name.is_none());
    assert!(view.app.sub_domain.is_none());
    // And the pair is claimable by the next application.
    let mut next = new_application("squatter");
    next.domain_name = Some("corp.example.com".to_owned());
    next.sub_domain = Some("www".to_owned());
    fc.create_application(next).await.unwrap();
}

#[tokio::test]
async fn delete_domain_is_owner_guarded() {
    let Fixture { fc, .. } = Fixture::new();
    let org_id = forecourt::entities::OrgId::new();
    fc.create_domain(new_domain("guarded.example.com", Some(org_id)))
        .await
        .unwrap();

    let err = fc
        .delete_domain(&forecourt::entities::OrgId::new(), "guarded.example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, forecourt::domains::Error::DomainTaken { .. }));
    assert!(fc.get_domain("guarded.example.com").await.unwrap().is_some());
}

/// Certificate deletion detaches before deleting, so no domain ever references a certificate
/// that's already gone.
#[tokio::test]
async fn delete_certificate_detaches_then_deletes() {
    let Fixture { fc, .. } = Fixture::new();
    let org_id = forecourt::entities::OrgId::new();
    fc.create_certificate(new_certificate("wildcard", &org_id))
        .await
        .unwrap();
    for name in ["a.example.com", "b.example.com", "c.example.com"] {
        let mut domain = new_domain(name, Some(org_id));
        if name != "c.example.com" {
            domain.certificate = Some("wildcard".to_owned());
        }
        fc.create_domain(domain).await.unwrap();
    }

    fc.delete_certificate(&org_id, "wildcard").await.unwrap();

    assert!(fc.get_certificate("wildcard").await.unwrap().is_none());
    for name in ["a.example.com", "b.example.com"] {
        assert!(fc.get_domain(name).await.unwrap().unwrap().certificate.is_none());
    }
    // c never referenced it; untouched.
    assert!(fc.get_domain("c.example.com").await.unwrap().unwrap().status.is_some());
}

#[tokio::test]
async fn delete_certificate_is_owner_guarded() {
    let Fixture { fc, .. } = Fixture::new();
    let org_id = forecourt::entities::OrgId::new();
    fc.create_certificate(new_certificate("mine", &org_id)).await.unwrap();

    let err = fc
        .delete_certificate(&forecourt::entities::OrgId::new(), "mine")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        forecourt::certificates::Error::NotOwned { .. }
    ));
    assert!(fc.get_certificate("mine").await.unwrap().is_some());
}
