//! Cognito user-pool implementation of the identity boundary.

use std::sync::Mutex;

use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;

use crate::error::DataError;
use crate::session::{ContactDirectory, IdentityProvider, SessionUser};

pub struct CognitoIdentity {
    client: CognitoClient,
    user_pool_id: String,
    client_id: String,
    // Access token of the most recent sign-in, for global sign-out.
    access_token: Mutex<Option<String>>,
}

impl CognitoIdentity {
    pub fn new(
        client: CognitoClient,
        user_pool_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        CognitoIdentity {
            client,
            user_pool_id: user_pool_id.into(),
            client_id: client_id.into(),
            access_token: Mutex::new(None),
        }
    }

    /// Resolve the user behind an access token via GetUser.
    async fn user_from_token(&self, access_token: &str) -> Result<SessionUser, DataError> {
        let result = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("Cognito get_user error: {}", e)))?;

        let mut user_id = None;
        let mut email = None;
        for attribute in result.user_attributes() {
            match attribute.name() {
                "sub" => user_id = attribute.value().map(str::to_string),
                "email" => email = attribute.value().map(str::to_string),
                _ => {}
            }
        }

        let user_id = user_id.ok_or_else(|| {
            DataError::Transport("Cognito user has no sub attribute".to_string())
        })?;
        Ok(SessionUser {
            user_id,
            email: email.unwrap_or_default(),
        })
    }

    fn remember_token(&self, token: &str) {
        *self.access_token.lock().unwrap() = Some(token.to_string());
    }
}

#[async_trait::async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser, DataError> {
        let result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("Cognito initiate_auth error: {}", e)))?;

        let token = result
            .authentication_result()
            .and_then(|r| r.access_token())
            .ok_or_else(|| {
                DataError::Transport("Cognito returned no access token".to_string())
            })?
            .to_string();

        self.remember_token(&token);
        self.user_from_token(&token).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, DataError> {
        let email_attribute = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| DataError::Transport(format!("Cognito attribute error: {}", e)))?;

        let result = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .user_attributes(email_attribute)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("Cognito sign_up error: {}", e)))?;

        Ok(SessionUser {
            user_id: result.user_sub().to_string(),
            email: email.to_string(),
        })
    }

    async fn sign_in_with_token(&self, access_token: &str) -> Result<SessionUser, DataError> {
        self.remember_token(access_token);
        self.user_from_token(access_token).await
    }

    async fn sign_out(&self) -> Result<(), DataError> {
        let token = self.access_token.lock().unwrap().take();
        if let Some(token) = token {
            self.client
                .global_sign_out()
                .access_token(token)
                .send()
                .await
                .map_err(|e| DataError::Transport(format!("Cognito global_sign_out error: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContactDirectory for CognitoIdentity {
    async fn email_for(&self, user_id: &str) -> Result<Option<String>, DataError> {
        let result = self
            .client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(user_id)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("Cognito admin_get_user error: {}", e)))?;

        Ok(result
            .user_attributes()
            .iter()
            .find(|attribute| attribute.name() == "email")
            .and_then(|attribute| attribute.value())
            .map(str::to_string))
    }
}
