use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::storage::{self, Storage, keys};

/// Query parameters Kakao appends when redirecting back to the app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user cancelled or consent failed.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    #[must_use]
    pub fn new(code: impl Into<String>, state: Option<&str>) -> Self {
        Self {
            code: Some(code.into()),
            state: state.map(str::to_owned),
            ..Self::default()
        }
    }

    /// Read the parameters off a callback URL. Empty values count as absent.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut query = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        query
    }

    pub(crate) fn code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.is_empty())
    }

    /// Provider-reported failure, preferring the human-readable description.
    pub(crate) fn provider_error(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match self.error_description.as_deref() {
            Some(description) => format!("{error}: {description}"),
            None => error.to_owned(),
        })
    }
}

/// Holds the tab-scoped "callback in progress" marker; clears it on drop.
///
/// Acquisition is synchronous, so checking and setting the marker happen
/// before the caller's first await.
pub(crate) struct CallbackGuard<'a> {
    tab: &'a dyn Storage,
}

impl<'a> CallbackGuard<'a> {
    /// `Ok(None)` when another invocation already holds the marker.
    pub(crate) fn acquire(tab: &'a dyn Storage) -> Result<Option<Self>, Error> {
        if tab.contains(keys::CALLBACK_PROCESSED) {
            return Ok(None);
        }
        tab.set(keys::CALLBACK_PROCESSED, "1")?;
        Ok(Some(Self { tab }))
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        storage::remove_quietly(self.tab, keys::CALLBACK_PROCESSED);
    }
}
