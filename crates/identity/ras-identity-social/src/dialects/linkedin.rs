use crate::dialect::{
    Dialect, DialectCore, base_fields, dialect_accessors, fetch_json, fetch_optional,
};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{merge_objects, required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const PROFILE_URL: &str = "https://api.linkedin.com/v2/me";
const EMAIL_URL: &str = "https://api.linkedin.com/v2/emailAddress";
const STILL_IMAGE: &str = "com.linkedin.digitalmedia.mediaartifact.StillImage";

pub struct LinkedinDialect {
    core: DialectCore,
}

impl LinkedinDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["r_liteprofile", "r_emailaddress"]),
        }
    }

    fn api_request(&self, url: &str, token: &str) -> HttpRequest {
        HttpRequest::get(url)
            .bearer_auth(token)
            .header("X-RestLi-Protocol-Version", "2.0.0")
    }
}

/// `en_US` style locale from `firstName.preferredLocale`.
fn preferred_locale(profile: &Value) -> Option<String> {
    let locale = profile.get("firstName")?.get("preferredLocale")?;
    let language = locale.get("language")?.as_str()?;
    let country = locale.get("country")?.as_str()?;
    Some(format!("{}_{}", language, country))
}

fn localized(profile: &Value, field: &str, locale: &str) -> Option<String> {
    profile
        .get(field)?
        .get("localized")?
        .get(locale)?
        .as_str()
        .map(str::to_string)
}

/// Display image whose still-image width is `width`, as its first identifier.
fn picture_of_width(profile: &Value, width: u64) -> Option<String> {
    profile
        .get("profilePicture")?
        .get("displayImage~")?
        .get("elements")?
        .as_array()?
        .iter()
        .find(|image| {
            image
                .get("data")
                .and_then(|data| data.get(STILL_IMAGE))
                .and_then(|still| still.get("storageSize"))
                .and_then(|size| size.get("width"))
                .and_then(Value::as_u64)
                == Some(width)
        })
        .and_then(|image| string_at(image, "identifiers.0.identifier"))
}

#[async_trait]
impl Dialect for LinkedinDialect {
    dialect_accessors!(ProviderKey::Linkedin);

    fn authorization_endpoint(&self) -> String {
        "https://www.linkedin.com/oauth/v2/authorization".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://www.linkedin.com/oauth/v2/accessToken".to_string()
    }

    fn scope_separator(&self) -> &'static str {
        " "
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = &tokens.access_token;
        let profile_request = self.api_request(PROFILE_URL, token).query([(
            "projection",
            "(id,firstName,lastName,profilePicture(displayImage~:playableStreams))",
        )]);
        let email_request = self.api_request(EMAIL_URL, token).query([
            ("q", "members"),
            ("projection", "(elements*(handle~))"),
        ]);

        let (profile, email) = tokio::join!(
            fetch_json(self.http(), self.provider(), profile_request),
            fetch_optional(self.http(), self.provider(), email_request),
        );

        let mut profile = profile?;
        if let Some(handle) = email.and_then(|body| {
            body.get("elements")
                .and_then(|elements| elements.get(0))
                .and_then(|element| element.get("handle~"))
                .cloned()
        }) {
            merge_objects(&mut profile, handle);
        }

        Ok(profile)
    }

    fn normalize_profile(&self, mut raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "id")?;

        let locale = preferred_locale(&raw);
        let first_name = locale
            .as_deref()
            .and_then(|locale| localized(&raw, "firstName", locale));
        let last_name = locale
            .as_deref()
            .and_then(|locale| localized(&raw, "lastName", locale));
        let avatar = picture_of_width(&raw, 100);
        let avatar_original = picture_of_width(&raw, 800);

        let display_name = match (&first_name, &last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(name), None) | (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        };

        if let Value::Object(map) = &mut raw {
            for (key, value) in [
                ("first_name", first_name),
                ("last_name", last_name),
                ("avatar_original", avatar_original),
            ] {
                map.insert(key.to_string(), value.map_or(Value::Null, Value::String));
            }
        }

        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.display_name = display_name;
        fields.email = string_at(&raw, "emailAddress");
        fields.avatar_url = avatar;
        fields.raw_profile = raw;
        Ok(fields)
    }
}
