//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::transport::Transport;
use crate::types::{Error, PollResponse, Update};

/// Replies to polls from a script. Once the script runs out, polls hang like
/// a held-open request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Option<PollResponse>>>,
    poll_urls: Mutex<Vec<String>>,
    posts: Mutex<Vec<(String, Vec<String>)>>,
    fail_posts: AtomicBool,
}

impl ScriptedTransport {
    pub(crate) fn push_response(&self, token: &str, updates: Vec<Update>) {
        self.push_raw(PollResponse {
            reconnect_with: Some(token.to_string()),
            updates: Some(updates),
        });
    }

    pub(crate) fn push_raw(&self, response: PollResponse) {
        self.replies.lock().unwrap().push_back(Some(response));
    }

    pub(crate) fn push_failure(&self) {
        self.replies.lock().unwrap().push_back(None);
    }

    pub(crate) fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn poll_urls(&self) -> Vec<String> {
        self.poll_urls.lock().unwrap().clone()
    }

    pub(crate) fn posts(&self) -> Vec<(String, Vec<String>)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn poll(&self, url: &str) -> Result<PollResponse, Error> {
        self.poll_urls.lock().unwrap().push(url.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Some(response)) => Ok(response),
            Some(None) => Err(Error::EmptyBody(url.to_string())),
            None => std::future::pending().await,
        }
    }

    async fn post_paths(&self, url: &str, paths: &[String]) -> Result<(), Error> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), paths.to_vec()));
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(())
    }
}
