use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Species the generator is asked to age down.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PetType {
    Cat,
    Dog,
}

/// Request body as received, with each field extracted on its own.
///
/// A missing or ill-typed field does not prevent the others from being read,
/// so `job_id` and `callback_url` are still available for the failure callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobRequest {
    pub job_id: Option<String>,
    pub pet_type: Option<Value>,
    pub image_keys: Option<Value>,
    pub breed: Option<Value>,
    pub watermark: Option<Value>,
    pub callback_url: Option<String>,
}

/// A validated generation job.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct Job {
    #[garde(length(min = 1))]
    pub job_id: String,

    #[garde(skip)]
    pub pet_type: PetType,

    #[garde(length(min = 1), inner(length(min = 1)))]
    pub image_keys: Vec<String>,

    #[garde(skip)]
    pub breed: Option<String>,

    #[garde(skip)]
    pub watermark: bool,

    #[garde(length(min = 1), custom(http_url))]
    pub callback_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    Missing(&'static str),

    #[error("Field {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid job: {0}")]
    Rules(#[from] garde::Report),
}

impl JobRequest {
    /// Pull the known fields out of a JSON body without failing on bad siblings.
    pub fn from_value(body: &Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;
        let present = |name: &str| object.get(name).filter(|v| !v.is_null()).cloned();

        Ok(Self {
            job_id: object.get("job_id").and_then(scalar_string),
            pet_type: present("pet_type"),
            image_keys: present("image_keys"),
            breed: present("breed"),
            watermark: present("watermark"),
            callback_url: object
                .get("callback_url")
                .and_then(Value::as_str)
                .filter(|url| !url.trim().is_empty())
                .map(str::to_string),
        })
    }

    /// Turn the raw request into a [`Job`], rejecting anything the pipeline can't run.
    pub fn validate(&self) -> Result<Job, ValidationError> {
        let job_id = self.job_id.clone().ok_or(ValidationError::Missing("job_id"))?;

        let pet_type = match self.pet_type.as_ref() {
            None => return Err(ValidationError::Missing("pet_type")),
            Some(Value::String(raw)) => {
                raw.trim()
                    .parse::<PetType>()
                    .map_err(|_| ValidationError::Invalid {
                        field: "pet_type",
                        reason: format!("has unsupported value '{}'", raw),
                    })?
            }
            Some(_) => {
                return Err(ValidationError::Invalid {
                    field: "pet_type",
                    reason: "must be a string".to_string(),
                })
            }
        };

        let image_keys = match self.image_keys.as_ref() {
            None => return Err(ValidationError::Missing("image_keys")),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ValidationError::Invalid {
                    field: "image_keys",
                    reason: "must contain only strings".to_string(),
                })?,
            Some(_) => {
                return Err(ValidationError::Invalid {
                    field: "image_keys",
                    reason: "must be an array of strings".to_string(),
                })
            }
        };

        let breed = match self.breed.as_ref() {
            None => None,
            Some(Value::String(raw)) if raw.trim().is_empty() => None,
            Some(Value::String(raw)) => Some(raw.trim().to_string()),
            Some(_) => {
                return Err(ValidationError::Invalid {
                    field: "breed",
                    reason: "must be a string".to_string(),
                })
            }
        };

        let watermark = match self.watermark.as_ref() {
            None => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(ValidationError::Invalid {
                    field: "watermark",
                    reason: "must be a boolean".to_string(),
                })
            }
        };

        let callback_url = self
            .callback_url
            .clone()
            .ok_or(ValidationError::Missing("callback_url"))?;

        let job = Job {
            job_id,
            pet_type,
            image_keys,
            breed,
            watermark,
            callback_url,
        };
        job.validate()?;
        Ok(job)
    }
}

impl Job {
    /// Object-store key of the generated image. Stable per job ID.
    pub fn result_key(&self) -> String {
        result_key_for(&self.job_id)
    }
}

pub fn result_key_for(job_id: &str) -> String {
    format!("results/{}.jpg", job_id)
}

/// Job IDs arrive as strings, but numeric IDs are accepted verbatim.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Absolute http(s) URL check used for callback destinations.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn http_url(value: &str, _ctx: &()) -> garde::Result {
    if is_http_url(value) {
        Ok(())
    } else {
        Err(garde::Error::new("must be an http or https URL"))
    }
}
