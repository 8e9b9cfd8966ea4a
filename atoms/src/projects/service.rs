use serde_json::Value;

use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::{null_or_string, DocumentStore, Fields, Query};

use crate::gateway;
use crate::projects::model::CreateProjectPayload;

/// Standing query for the signed-in user's project list. The owner id is
/// the tenancy scope; no ordering is requested.
pub fn user_projects_query(user: &SessionUser) -> Query {
    Query::new("projects", "ownerId", user.user_id.as_str())
}

/// Create a project owned by the session user. The folder provisioner
/// fills in `driveFolderId` later, out of band.
pub async fn create_project(
    store: &dyn DocumentStore,
    payload: CreateProjectPayload,
    session: &SessionUser,
) -> Result<String, DataError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(DataError::Validation("project name is required".to_string()));
    }

    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::String(name.to_string()));
    fields.insert("description".to_string(), null_or_string(payload.description));

    gateway::create_stamped(store, "projects", fields, "ownerId", "createdAt", session).await
}

#[cfg(test)]
mod tests {
    use taskhub_shared::store::memory::MemoryStore;
    use taskhub_shared::store::FromRecord;

    use super::*;
    use crate::projects::model::Project;

    fn session(id: &str) -> SessionUser {
        SessionUser {
            user_id: id.to_string(),
            email: format!("{}@example.com", id),
        }
    }

    #[tokio::test]
    async fn create_stamps_owner_and_server_timestamp() {
        let store = MemoryStore::new();
        let id = create_project(
            &store,
            CreateProjectPayload {
                name: "Website Redesign".to_string(),
                description: None,
            },
            &session("u1"),
        )
        .await
        .unwrap();

        let project = Project::from_record(&store.get("projects", &id).await.unwrap().unwrap());
        assert_eq!(project.owner_id, "u1");
        assert_eq!(project.name, "Website Redesign");
        assert!(project.created_at.is_some());
        assert!(project.drive_folder_id.is_none());
    }

    #[tokio::test]
    async fn project_list_is_scoped_to_the_owner() {
        let store = MemoryStore::new();
        let mine = session("u1");
        let theirs = session("u2");
        create_project(
            &store,
            CreateProjectPayload { name: "Mine".to_string(), description: None },
            &mine,
        )
        .await
        .unwrap();
        create_project(
            &store,
            CreateProjectPayload { name: "Theirs".to_string(), description: None },
            &theirs,
        )
        .await
        .unwrap();

        let results = store.query(&user_projects_query(&mine)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].str("name"), Some("Mine"));
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = MemoryStore::new();
        let err = create_project(
            &store,
            CreateProjectPayload { name: "  ".to_string(), description: None },
            &session("u1"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
    }
}
