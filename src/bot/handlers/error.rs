//! Framework error handler.

use crate::{bot::BotData, errors::Error};
use tracing::{debug, error, warn};

/// Handles errors raised by the framework or returned from commands.
///
/// Rejections the user can act on (validation, permissions, missing records) are
/// answered ephemerally with [`Error::user_message`]; everything else is logged
/// and answered with the generic text.
pub async fn on_error(framework_error: poise::FrameworkError<'_, BotData, Error>) {
    match framework_error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            let command = ctx.command().qualified_name.clone();
            match &error {
                Error::Validation { .. }
                | Error::PermissionDenied { .. }
                | Error::Unauthenticated
                | Error::NotFound { .. } => {
                    debug!(%command, %error, "Command rejected");
                }
                _ if error.is_persistence() => {
                    warn!(%command, ?error, "Command failed in an external service");
                }
                _ => {
                    error!(%command, ?error, "Command failed");
                }
            }
            let reply = poise::CreateReply::default()
                .content(error.user_message())
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to send error message: {e}");
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}
