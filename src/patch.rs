use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::error::AppError;

/// Parses a PATCH body, rejecting it outright when it names any field outside
/// `allowed`.
pub fn parse_patch<T>(body: Value, allowed: &[&str]) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    let fields = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Invalid updates!".to_string()))?;

    if fields.keys().any(|key| !allowed.contains(&key.as_str())) {
        return Err(AppError::BadRequest("Invalid updates!".to_string()));
    }

    let patch: T =
        serde_json::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    patch
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    Ok(patch)
}
