//! Shared fakes for pipeline tests: a scriptable platform, a map-backed
//! profile resolver, and a recording config publisher.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use botminter::{
    AccessToken, AccountRegisterer, AdminAccountView, ConfigPublisher, FeedEntry, FetchError,
    MemoryRegistrationStore, NewAccount, NewStatus, OriginStatus, PinnedStatus, PlatformClient,
    PlatformError, ProfileInfo, ProfileResolver, PublishError, RegistererSettings,
    RegistrationRecord, RegistrationStore, SetupTargets, Visibility,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateAccount(String),
    UnblockEmail(String),
    FindAdmin(String),
    Setup(String),
    Follow(String),
    Publish(String),
    Edit(String),
    Pin(String),
    UploadMedia,
}

#[derive(Default)]
pub struct PlatformState {
    pub accounts: HashMap<String, AdminAccountView>,
    /// Polls remaining until a created account flips to confirmed.
    pub confirm_after_polls: HashMap<String, u32>,
    pub origin_statuses: HashMap<String, OriginStatus>,
    /// Errors returned by `create_account` before it starts succeeding.
    pub create_failures: VecDeque<PlatformError>,
    pub pinned: Option<PinnedStatus>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakePlatform {
    pub state: Mutex<PlatformState>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_origin(&self, request_id: &str, handle: &str) {
        self.state.lock().unwrap().origin_statuses.insert(
            request_id.to_string(),
            OriginStatus {
                id: request_id.to_string(),
                account_handle: handle.to_string(),
                visibility: Visibility::Direct,
            },
        );
    }

    pub fn seed_account(&self, name: &str, confirmed: bool, disabled: bool) {
        self.state.lock().unwrap().accounts.insert(
            name.to_string(),
            AdminAccountView {
                id: format!("id-{name}"),
                username: name.to_string(),
                confirmed,
                disabled,
                profile_url: format!("https://social.example/@{name}"),
            },
        );
    }

    pub fn confirm_after(&self, name: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .confirm_after_polls
            .insert(name.to_string(), polls);
    }

    pub fn script_create_failure(&self, error: PlatformError) {
        self.state.lock().unwrap().create_failures.push_back(error);
    }

    pub fn set_pinned(&self, id: &str, content: &str) {
        self.state.lock().unwrap().pinned = Some(PinnedStatus {
            id: id.to_string(),
            content: content.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateAccount(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn find_calls(&self, name: &str) -> usize {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::FindAdmin(n) if n == name))
            .count()
    }

    pub fn setup_calls(&self) -> usize {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Setup(_)))
            .count()
    }

    pub fn published_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn create_account(&self, account: NewAccount) -> Result<AccessToken, PlatformError> {
        self.record(Call::CreateAccount(account.username.clone()));
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }
        let confirmed = state
            .confirm_after_polls
            .get(&account.username)
            .copied()
            .unwrap_or(0)
            == 0;
        state.accounts.insert(
            account.username.clone(),
            AdminAccountView {
                id: format!("id-{}", account.username),
                username: account.username.clone(),
                confirmed,
                disabled: false,
                profile_url: format!("https://social.example/@{}", account.username),
            },
        );
        Ok(AccessToken::new(format!("token-{}", account.username)))
    }

    async fn unblock_email(&self, email: &str) -> Result<(), PlatformError> {
        self.record(Call::UnblockEmail(email.to_string()));
        Ok(())
    }

    async fn find_admin_account(
        &self,
        username: &str,
    ) -> Result<Option<AdminAccountView>, PlatformError> {
        self.record(Call::FindAdmin(username.to_string()));
        let mut state = self.state.lock().unwrap();
        let confirm = match state.accounts.get(username) {
            Some(account) if !account.confirmed => {
                match state.confirm_after_polls.get_mut(username) {
                    Some(polls) => {
                        *polls = polls.saturating_sub(1);
                        *polls == 0
                    }
                    None => false,
                }
            }
            _ => false,
        };
        if confirm {
            if let Some(account) = state.accounts.get_mut(username) {
                account.confirmed = true;
            }
        }
        Ok(state.accounts.get(username).cloned())
    }

    async fn apply_profile_setup(
        &self,
        _token: &AccessToken,
        profile: &ProfileInfo,
        _targets: SetupTargets,
    ) -> Result<(), PlatformError> {
        self.record(Call::Setup(profile.name.clone()));
        Ok(())
    }

    async fn follow(&self, bot_id: &str) -> Result<(), PlatformError> {
        self.record(Call::Follow(bot_id.to_string()));
        Ok(())
    }

    async fn get_status(&self, status_id: &str) -> Result<Option<OriginStatus>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .origin_statuses
            .get(status_id)
            .cloned())
    }

    async fn publish(&self, status: NewStatus) -> Result<String, PlatformError> {
        self.record(Call::Publish(status.text.clone()));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        Ok(format!("status-{}", state.next_id))
    }

    async fn edit_status(&self, status_id: &str, text: &str) -> Result<(), PlatformError> {
        self.record(Call::Edit(status_id.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(pinned) = state.pinned.as_mut() {
            if pinned.id == status_id {
                pinned.content = text.to_string();
            }
        }
        Ok(())
    }

    async fn pin_status(&self, status_id: &str) -> Result<(), PlatformError> {
        self.record(Call::Pin(status_id.to_string()));
        Ok(())
    }

    async fn first_pinned_status(&self) -> Result<Option<PinnedStatus>, PlatformError> {
        Ok(self.state.lock().unwrap().pinned.clone())
    }

    async fn upload_media(&self, _bytes: Vec<u8>) -> Result<String, PlatformError> {
        self.record(Call::UploadMedia);
        Ok("media-1".to_string())
    }
}

#[derive(Default)]
pub struct FakeResolver {
    profiles: Mutex<HashMap<String, ProfileInfo>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&self, url: &str, profile: ProfileInfo) {
        self.profiles
            .lock()
            .unwrap()
            .insert(url.to_string(), profile);
    }
}

#[async_trait]
impl ProfileResolver for FakeResolver {
    async fn resolve(&self, url: &str) -> Result<ProfileInfo, FetchError> {
        self.profiles
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NoFeed {
                url: url.to_string(),
            })
    }
}

pub fn profile(name: &str, feed_url: &str) -> ProfileInfo {
    ProfileInfo {
        name: name.to_string(),
        icon_path: None,
        thumbnail_path: None,
        title: format!("{name} site"),
        description: "a site".to_string(),
        language: "en".to_string(),
        link: feed_url.trim_end_matches("/feed").to_string(),
        feed_url: feed_url.to_string(),
        tags: vec!["news".to_string()],
        interval: Duration::from_secs(20 * 60),
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    entries: Mutex<Vec<FeedEntry>>,
    attempts: Mutex<usize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an entry, as if a previous run had already appended it.
    pub fn seed_entry(&self, entry: FeedEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<FeedEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl ConfigPublisher for RecordingPublisher {
    async fn append_entry(&self, entry: FeedEntry) -> Result<bool, PublishError> {
        *self.attempts.lock().unwrap() += 1;
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|existing| existing.name == entry.name) {
            return Ok(false);
        }
        entries.push(entry);
        Ok(true)
    }
}

pub struct Harness {
    pub registerer: AccountRegisterer,
    pub store: Arc<MemoryRegistrationStore>,
    pub platform: Arc<FakePlatform>,
    pub resolver: Arc<FakeResolver>,
    pub publisher: Arc<RecordingPublisher>,
}

/// Settings with a creation burst large enough that the proactive limiter
/// never blocks a test on wall-clock time.
pub fn test_settings() -> RegistererSettings {
    RegistererSettings {
        create_burst: 50,
        ..RegistererSettings::default()
    }
}

pub fn harness() -> Harness {
    harness_with(
        Arc::new(MemoryRegistrationStore::new()),
        Arc::new(FakePlatform::new()),
        Arc::new(FakeResolver::new()),
        Arc::new(RecordingPublisher::new()),
    )
}

pub fn harness_with(
    store: Arc<MemoryRegistrationStore>,
    platform: Arc<FakePlatform>,
    resolver: Arc<FakeResolver>,
    publisher: Arc<RecordingPublisher>,
) -> Harness {
    let registerer = AccountRegisterer::spawn(
        store.clone(),
        platform.clone(),
        resolver.clone(),
        publisher.clone(),
        test_settings(),
    );
    Harness {
        registerer,
        store,
        platform,
        resolver,
        publisher,
    }
}

/// Poll the store until the record finishes. Virtual time advances while the
/// test waits, so cooldowns and poll intervals elapse instantly.
pub async fn wait_finished(
    store: &MemoryRegistrationStore,
    url: &str,
    request_id: &str,
) -> RegistrationRecord {
    for _ in 0..20_000 {
        if let Some(record) = store.find(url, request_id).await.unwrap() {
            if record.finished {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("request {url}#{request_id} never finished");
}
