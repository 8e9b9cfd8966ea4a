//! Stream-triggered folder provisioning worker. Listens on the table's
//! change stream, feeds every observed write into the local change feed,
//! and provisions an external folder for every inserted project record.

use std::env;
use std::sync::Arc;

use aws_lambda_events::event::dynamodb::Event;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

use taskhub_shared::session::cognito::CognitoIdentity;
use taskhub_shared::store::dynamo::DynamoStore;
use taskhub_shared::store::{ChangeEvent, ChangeKind};

mod folders;
mod provisioner;

use folders::S3FolderService;
use provisioner::{NewProject, Provisioner};

struct Worker {
    store: Arc<DynamoStore>,
    provisioner: Provisioner,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .without_time()
        .init();

    let table_name = env::var("TABLE_NAME")?;
    let bucket = env::var("FOLDER_BUCKET")?;
    let user_pool_id = env::var("COGNITO_USER_POOL_ID")?;
    let from_address = env::var("SHARE_FROM_ADDRESS")?;

    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let contacts = Arc::new(CognitoIdentity::new(
        aws_sdk_cognitoidentityprovider::Client::new(&config),
        user_pool_id,
        // The worker only does directory lookups; no app client involved.
        String::new(),
    ));
    let folder_service = Arc::new(S3FolderService::new(
        aws_sdk_s3::Client::new(&config),
        aws_sdk_sesv2::Client::new(&config),
        bucket,
        from_address,
    ));
    let store = Arc::new(DynamoStore::new(
        aws_sdk_dynamodb::Client::new(&config),
        table_name,
    ));

    let worker = Arc::new(Worker {
        store: store.clone(),
        provisioner: Provisioner::new(contacts, folder_service, store),
    });

    run(service_fn(move |event: LambdaEvent<Event>| {
        let worker = worker.clone();
        async move { handle(&worker, event).await }
    }))
    .await
}

/// One invocation covers a batch of stream records. Every record is fed
/// into the local change feed so standing subscriptions in this process
/// re-query; project inserts additionally get a folder provisioned. A
/// failed provisioning logs and moves on so one bad record cannot wedge
/// the batch.
async fn handle(worker: &Worker, event: LambdaEvent<Event>) -> Result<(), Error> {
    for record in event.payload.records {
        let keys = serde_json::to_value(&record.change.keys)?;
        let (Some(collection), Some(id)) = (keys["PK"]["S"].as_str(), keys["SK"]["S"].as_str())
        else {
            continue;
        };
        let kind = match record.event_name.as_str() {
            "INSERT" => ChangeKind::Created,
            "MODIFY" => ChangeKind::Updated,
            "REMOVE" => ChangeKind::Deleted,
            _ => continue,
        };
        worker.store.notify_external(ChangeEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });

        if kind != ChangeKind::Created || collection != "projects" {
            continue;
        }

        let image = serde_json::to_value(&record.change.new_image)?;
        let project = NewProject {
            id: id.to_string(),
            name: image["name"]["S"].as_str().unwrap_or_default().to_string(),
            owner_id: image["ownerId"]["S"].as_str().map(str::to_string),
        };

        if let Err(e) = worker.provisioner.provision(&project).await {
            tracing::error!(project = %project.id, error = %e, "folder provisioning failed");
        }
    }
    Ok(())
}
