use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::limits::*;
use crate::model::{Owner, Profile, ProfileId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    HandleTaken(String),
    HandleLengthInvalid(usize),
    HandleContainsInvalidCharacters(String),
    ProfileNotFound(ProfileId),
    HandleNotFound(String),
    LimitExceeded(&'static str),
}

impl ProfileError {
    pub fn code(&self) -> &'static str {
        match self {
            ProfileError::HandleTaken(_) => "handle_taken",
            ProfileError::HandleLengthInvalid(_) => "handle_length_invalid",
            ProfileError::HandleContainsInvalidCharacters(_) => "handle_invalid_characters",
            ProfileError::ProfileNotFound(_) => "profile_not_found",
            ProfileError::HandleNotFound(_) => "handle_not_found",
            ProfileError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::HandleTaken(h) => write!(f, "handle already taken: {h}"),
            ProfileError::HandleLengthInvalid(len) => {
                write!(f, "handle length {len} not in 1..={MAX_HANDLE_LEN}")
            }
            ProfileError::HandleContainsInvalidCharacters(h) => {
                write!(f, "handle contains invalid characters: {h:?}")
            }
            ProfileError::ProfileNotFound(id) => write!(f, "profile not found: {id}"),
            ProfileError::HandleNotFound(h) => write!(f, "no profile with handle: {h}"),
            ProfileError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for ProfileError {}

/// Lowercase letters, digits, `.`, `-` and `_`, 1 to 31 bytes.
pub fn validate_handle(handle: &str) -> Result<(), ProfileError> {
    if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
        return Err(ProfileError::HandleLengthInvalid(handle.len()));
    }
    let valid = handle
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'));
    if !valid {
        return Err(ProfileError::HandleContainsInvalidCharacters(handle.to_string()));
    }
    Ok(())
}

/// Host profiles with globally unique handles. Ids start at 1.
pub struct ProfileRegistry {
    profiles: DashMap<ProfileId, Profile>,
    by_handle: DashMap<String, ProfileId>,
    next_id: AtomicU64,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            by_handle: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create_profile(
        &self,
        owner: Owner,
        handle: &str,
        image_uri: &str,
    ) -> Result<Profile, ProfileError> {
        validate_handle(handle)?;
        if image_uri.len() > MAX_IMAGE_URI_LEN {
            return Err(ProfileError::LimitExceeded("image uri too long"));
        }
        if self.profiles.len() >= MAX_PROFILES {
            return Err(ProfileError::LimitExceeded("too many profiles"));
        }

        // Holding the vacant handle entry makes claim-and-insert atomic.
        match self.by_handle.entry(handle.to_string()) {
            Entry::Occupied(_) => Err(ProfileError::HandleTaken(handle.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let profile = Profile {
                    id,
                    owner,
                    handle: handle.to_string(),
                    image_uri: image_uri.to_string(),
                };
                self.profiles.insert(id, profile.clone());
                slot.insert(id);
                Ok(profile)
            }
        }
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn get_profile_by_id(&self, id: ProfileId) -> Result<Profile, ProfileError> {
        self.profiles
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(ProfileError::ProfileNotFound(id))
    }

    pub fn get_profile_by_handle(&self, handle: &str) -> Result<Profile, ProfileError> {
        let id = self
            .by_handle
            .get(handle)
            .map(|e| *e.value())
            .ok_or_else(|| ProfileError::HandleNotFound(handle.to_string()))?;
        self.get_profile_by_id(id)
    }

    /// All profiles owned by `owner`, oldest first.
    pub fn get_user_profiles(&self, owner: &Owner) -> Vec<Profile> {
        let mut out: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|e| &e.value().owner == owner)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|p| p.id);
        out
    }

    pub fn owner_of(&self, id: ProfileId) -> Result<Owner, ProfileError> {
        self.profiles
            .get(&id)
            .map(|e| e.value().owner.clone())
            .ok_or(ProfileError::ProfileNotFound(id))
    }
}
