//! Integration tests for quarry-tenancy over the in-memory backend.

use quarry_core::audit::AuditLogger;
use quarry_core::config::AuthConfig;
use quarry_core::error::QuarryError;
use quarry_core::ids::{CorrelationId, DomainId};
use quarry_core::traits::{AuditRepository, TenantRepository};
use quarry_core::types::{AccessMode, AiConfig, Domain, OrgMember, Permission, Role};
use quarry_storage::MemoryBackend;
use quarry_tenancy::TenantService;
use std::collections::HashMap;
use std::sync::Arc;

fn service(backend: &MemoryBackend) -> TenantService {
    let repo: Arc<dyn TenantRepository> = Arc::new(backend.clone());
    let audit_repo: Arc<dyn AuditRepository> = Arc::new(backend.clone());
    let config = AuthConfig {
        bcrypt_cost: 4,
        ..AuthConfig::default()
    };
    TenantService::new(repo, AuditLogger::new(audit_repo), config)
}

#[tokio::test]
async fn test_register_login_verify_round_trip() {
    let backend = MemoryBackend::new();
    let service = service(&backend);

    let user = service
        .register("alice@example.com", "correct horse battery")
        .await
        .unwrap();

    let tokens = service
        .authenticate("alice@example.com", "correct horse battery", CorrelationId::new())
        .await
        .unwrap();
    assert_eq!(tokens.user.id, user.id);

    let claims = service.verify(&tokens.access_token).unwrap();
    assert_eq!(claims.sub, user.id);
}

#[tokio::test]
async fn test_wrong_password_is_opaque() {
    let backend = MemoryBackend::new();
    let service = service(&backend);
    service
        .register("bob@example.com", "a strong password")
        .await
        .unwrap();

    let err = service
        .authenticate("bob@example.com", "wrong password", CorrelationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Unauthenticated));
    // Unknown email fails the same way.
    let err = service
        .authenticate("nobody@example.com", "whatever-pass", CorrelationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Unauthenticated));
}

#[tokio::test]
async fn test_refresh_rotation_and_replay_revokes_chain() {
    let backend = MemoryBackend::new();
    let service = service(&backend);
    service
        .register("carol@example.com", "a strong password")
        .await
        .unwrap();

    let first = service
        .authenticate("carol@example.com", "a strong password", CorrelationId::new())
        .await
        .unwrap();

    let second = service
        .refresh(&first.refresh_token, CorrelationId::new())
        .await
        .unwrap();
    assert_ne!(first.refresh_token, second.refresh_token);
    // The old access token's session was retired by the rotation.
    assert!(service.verify(&first.access_token).is_err());
    assert!(service.verify(&second.access_token).is_ok());

    // Replaying the rotated refresh token burns the whole chain.
    let err = service
        .refresh(&first.refresh_token, CorrelationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Unauthenticated));
    assert!(service.verify(&second.access_token).is_err());
}

#[tokio::test]
async fn test_require_checks_role_permissions() {
    let backend = MemoryBackend::new();
    let service = service(&backend);

    let admin = service
        .register("owner@example.com", "a strong password")
        .await
        .unwrap();
    let org_id = backend
        .list_memberships(admin.id)
        .await
        .unwrap()[0]
        .org_id;

    // A viewer role that can read chat but not write files.
    backend
        .upsert_role(
            org_id,
            Role {
                name: "viewer".to_string(),
                permissions: [Permission::from("chat:read")].into_iter().collect(),
            },
        )
        .await
        .unwrap();
    let viewer = service
        .register("viewer@example.com", "a strong password")
        .await
        .unwrap();
    backend
        .upsert_member(OrgMember {
            org_id,
            user_id: viewer.id,
            role: "viewer".to_string(),
            active: false,
        })
        .await
        .unwrap();

    let correlation = CorrelationId::new();
    service
        .require(admin.id, &Permission::from("files:write"), org_id, None, correlation)
        .await
        .unwrap();
    service
        .require(viewer.id, &Permission::from("chat:read"), org_id, None, correlation)
        .await
        .unwrap();

    let err = service
        .require(viewer.id, &Permission::from("files:write"), org_id, None, correlation)
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::PermissionDenied { .. }));
    assert_eq!(err.user_message(), "access denied");
}

#[tokio::test]
async fn test_domain_in_another_org_reads_as_not_found() {
    let backend = MemoryBackend::new();
    let service = service(&backend);

    let alice = service
        .register("alice@two-orgs.example", "a strong password")
        .await
        .unwrap();
    let bob = service
        .register("bob@two-orgs.example", "a strong password")
        .await
        .unwrap();

    let alice_org = backend.list_memberships(alice.id).await.unwrap()[0].org_id;
    let bob_org = backend.list_memberships(bob.id).await.unwrap()[0].org_id;

    let domain = Domain {
        id: DomainId::new(),
        org_id: alice_org,
        name: "support".to_string(),
        display_name: "Support".to_string(),
        template: "support".to_string(),
        ai_config: AiConfig::default(),
        access_mode: AccessMode::Public,
        settings: HashMap::new(),
        created_at: chrono::Utc::now(),
    };
    backend.create_domain(domain.clone()).await.unwrap();

    // Bob probes Alice's domain through his own org: existence must not
    // leak, so this is NotFound rather than PermissionDenied.
    let err = service
        .require(
            bob.id,
            &Permission::from("chat:write"),
            bob_org,
            Some(domain.id),
            CorrelationId::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::NotFound { .. }));
}

#[tokio::test]
async fn test_restricted_domain_visibility() {
    let backend = MemoryBackend::new();
    let service = service(&backend);

    let admin = service
        .register("admin@restricted.example", "a strong password")
        .await
        .unwrap();
    let org_id = backend.list_memberships(admin.id).await.unwrap()[0].org_id;

    backend
        .upsert_role(
            org_id,
            Role {
                name: "member".to_string(),
                permissions: [Permission::from("chat:write")].into_iter().collect(),
            },
        )
        .await
        .unwrap();

    let insider = service
        .register("insider@restricted.example", "a strong password")
        .await
        .unwrap();
    let outsider = service
        .register("outsider@restricted.example", "a strong password")
        .await
        .unwrap();
    for user in [&insider, &outsider] {
        backend
            .upsert_member(OrgMember {
                org_id,
                user_id: user.id,
                role: "member".to_string(),
                active: false,
            })
            .await
            .unwrap();
    }

    let domain = Domain {
        id: DomainId::new(),
        org_id,
        name: "internal".to_string(),
        display_name: "Internal".to_string(),
        template: "docs".to_string(),
        ai_config: AiConfig::default(),
        access_mode: AccessMode::Restricted {
            allowed_users: [insider.id].into_iter().collect(),
        },
        settings: HashMap::new(),
        created_at: chrono::Utc::now(),
    };
    backend.create_domain(domain.clone()).await.unwrap();

    let correlation = CorrelationId::new();
    service
        .require(insider.id, &Permission::from("chat:write"), org_id, Some(domain.id), correlation)
        .await
        .unwrap();
    let err = service
        .require(outsider.id, &Permission::from("chat:write"), org_id, Some(domain.id), correlation)
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::PermissionDenied { .. }));

    // scope() only lists the visible domain for the insider.
    let insider_scope = service.scope(insider.id, org_id).await.unwrap();
    assert!(insider_scope.domain_ids.contains(&domain.id));
    let outsider_scope = service.scope(outsider.id, org_id).await.unwrap();
    assert!(!outsider_scope.domain_ids.contains(&domain.id));
}
