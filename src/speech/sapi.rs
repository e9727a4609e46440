//! SAPI 5 speech backend (Windows).
//!
//! The voice object is apartment-threaded, so a dedicated worker thread owns
//! it and everything else talks to it through a command channel. Speaks run
//! asynchronously on the engine with a short completion poll, which is what
//! lets `cancel` purge an utterance mid-sentence from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use windows::core::HSTRING;
use windows::Win32::Media::Speech::{
    ISpObjectToken, ISpObjectTokenCategory, ISpVoice, SpObjectTokenCategory, SpVoice,
    SPF_ASYNC, SPF_PURGEBEFORESPEAK, SPRS_DONE, SPVOICESTATUS,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED,
};

use super::{CancelToken, SpeechBackend, Utterance};
use crate::settings::{MAX_WPM, MIN_WPM};

const SPCAT_VOICES: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Speech\Voices";

enum VoiceCommand {
    Speak {
        text: String,
        purge: Arc<AtomicBool>,
        done: oneshot::Sender<Result<()>>,
    },
    SetRate(i32),
    SetVoice(String),
    ListVoices(mpsc::Sender<Vec<String>>),
    Purge,
    Shutdown,
}

pub struct SapiBackend {
    tx: Sender<VoiceCommand>,
    speaking: Arc<AtomicBool>,
    current_purge: std::sync::Mutex<Option<Arc<AtomicBool>>>,
}

impl SapiBackend {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<VoiceCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let speaking = Arc::new(AtomicBool::new(false));

        let worker_speaking = speaking.clone();
        std::thread::Builder::new()
            .name("ariavox-sapi".to_string())
            .spawn(move || {
                unsafe {
                    if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
                        let _ = ready_tx.send(Err(anyhow!("CoInitializeEx failed: {e}")));
                        return;
                    }
                }
                let voice: ISpVoice = match unsafe { CoCreateInstance(&SpVoice, None, CLSCTX_ALL) }
                {
                    Ok(voice) => voice,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("SpVoice creation failed: {e}")));
                        unsafe { CoUninitialize() };
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(command) = rx.recv() {
                    match command {
                        VoiceCommand::Speak { text, purge, done } => {
                            worker_speaking.store(true, Ordering::SeqCst);
                            let result = speak_blocking(&voice, &text, &purge);
                            worker_speaking.store(false, Ordering::SeqCst);
                            let _ = done.send(result);
                        }
                        VoiceCommand::SetRate(rate) => {
                            if let Err(e) = unsafe { voice.SetRate(rate) } {
                                warn!("SetRate failed: {e}");
                            }
                        }
                        VoiceCommand::SetVoice(name) => {
                            if let Err(e) = set_voice_by_name(&voice, &name) {
                                warn!("SetVoice {name:?} failed: {e:#}");
                            }
                        }
                        VoiceCommand::ListVoices(reply) => {
                            let _ = reply.send(list_voices().unwrap_or_default());
                        }
                        VoiceCommand::Purge => {
                            purge_now(&voice);
                        }
                        VoiceCommand::Shutdown => break,
                    }
                }

                drop(voice);
                unsafe { CoUninitialize() };
                debug!("SAPI worker stopped");
            })
            .context("Failed to spawn SAPI worker")?;

        ready_rx
            .recv()
            .context("SAPI worker exited before reporting")??;

        Ok(Self {
            tx,
            speaking,
            current_purge: std::sync::Mutex::new(None),
        })
    }
}

impl Drop for SapiBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(VoiceCommand::Shutdown);
    }
}

#[async_trait]
impl SpeechBackend for SapiBackend {
    async fn speak(&self, utterance: &Utterance, cancel: &CancelToken) -> Result<()> {
        let purge = Arc::new(AtomicBool::new(false));
        *self
            .current_purge
            .lock()
            .expect("purge lock poisoned") = Some(purge.clone());

        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(VoiceCommand::Speak {
                text: utterance.text.clone(),
                purge: purge.clone(),
                done: done_tx,
            })
            .map_err(|_| anyhow!("SAPI worker is gone"))?;

        tokio::select! {
            result = done_rx => result.context("SAPI worker dropped the reply")?,
            _ = cancel.cancelled() => {
                purge.store(true, Ordering::SeqCst);
                let _ = self.tx.send(VoiceCommand::Purge);
                Ok(())
            }
        }
    }

    fn cancel(&self) {
        if let Some(purge) = self
            .current_purge
            .lock()
            .expect("purge lock poisoned")
            .as_ref()
        {
            purge.store(true, Ordering::SeqCst);
        }
        let _ = self.tx.send(VoiceCommand::Purge);
    }

    fn set_rate(&self, wpm: u32) -> Result<()> {
        let _ = self.tx.send(VoiceCommand::SetRate(wpm_to_sapi_rate(wpm)));
        Ok(())
    }

    fn set_voice(&self, name: &str) -> Result<()> {
        let _ = self.tx.send(VoiceCommand::SetVoice(name.to_string()));
        Ok(())
    }

    fn available_voices(&self) -> Vec<String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.tx.send(VoiceCommand::ListVoices(reply_tx)).is_err() {
            return Vec::new();
        }
        reply_rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .unwrap_or_default()
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

/// Maps the user-facing WPM range linearly onto SAPI's [-10, 10].
fn wpm_to_sapi_rate(wpm: u32) -> i32 {
    let wpm = wpm.clamp(MIN_WPM, MAX_WPM) as i64;
    let span = (MAX_WPM - MIN_WPM) as i64;
    ((wpm - MIN_WPM as i64) * 20 / span - 10) as i32
}

/// Speaks asynchronously and polls engine status so a purge request can
/// take effect mid-utterance. (WaitUntilDone reports its timeout as
/// S_FALSE, which success-maps in windows-rs, so status polling it is.)
fn speak_blocking(voice: &ISpVoice, text: &str, purge: &AtomicBool) -> Result<()> {
    let text = HSTRING::from(text);
    unsafe {
        voice
            .Speak(&text, SPF_ASYNC.0 as u32, None)
            .context("Speak failed")?;
    }
    loop {
        if purge.load(Ordering::SeqCst) {
            purge_now(voice);
            return Ok(());
        }
        let mut status = SPVOICESTATUS::default();
        unsafe {
            voice
                .GetStatus(&mut status, std::ptr::null_mut())
                .context("GetStatus failed")?;
        }
        if status.dwRunningState == SPRS_DONE.0 as u32 {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}

/// Purges anything queued on the engine.
fn purge_now(voice: &ISpVoice) {
    let empty = HSTRING::new();
    unsafe {
        let _ = voice.Speak(&empty, SPF_PURGEBEFORESPEAK.0 as u32, None);
    }
}

fn set_voice_by_name(voice: &ISpVoice, name: &str) -> Result<()> {
    let token = find_voice_token(name)?.ok_or_else(|| anyhow!("no voice named {name:?}"))?;
    unsafe { voice.SetVoice(&token).context("SetVoice failed") }
}

fn list_voices() -> Result<Vec<String>> {
    let mut names = Vec::new();
    for_each_voice_token(|token| {
        if let Ok(description) = token_description(&token) {
            names.push(description);
        }
    })?;
    Ok(names)
}

fn find_voice_token(name: &str) -> Result<Option<ISpObjectToken>> {
    let mut found = None;
    for_each_voice_token(|token| {
        if found.is_none() {
            if let Ok(description) = token_description(&token) {
                if description == name {
                    found = Some(token);
                }
            }
        }
    })?;
    Ok(found)
}

fn for_each_voice_token(mut f: impl FnMut(ISpObjectToken)) -> Result<()> {
    unsafe {
        let category: ISpObjectTokenCategory =
            CoCreateInstance(&SpObjectTokenCategory, None, CLSCTX_ALL)
                .context("Token category creation failed")?;
        category
            .SetId(&HSTRING::from(SPCAT_VOICES), false)
            .context("SetId failed")?;
        let tokens = category
            .EnumTokens(None, None)
            .context("EnumTokens failed")?;
        loop {
            let mut token = None;
            let mut fetched = 0u32;
            if tokens.Next(1, &mut token, Some(&mut fetched)).is_err() || fetched == 0 {
                break;
            }
            if let Some(token) = token {
                f(token);
            }
        }
    }
    Ok(())
}

fn token_description(token: &ISpObjectToken) -> Result<String> {
    unsafe {
        let value = token
            .GetStringValue(None)
            .context("GetStringValue failed")?;
        Ok(value.to_string())
    }
}
