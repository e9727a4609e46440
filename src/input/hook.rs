//! Low-level keyboard hook (Windows).
//!
//! The hook thread runs its own message pump: Windows silently removes
//! low-level hooks whose threads do not pump messages or whose callbacks are
//! slow. The callback is the hottest path in the process; it reads the hook
//! struct and the async key-state table, writes one fixed-size event into
//! the drop-oldest queue, and forwards to the next hook. No allocation, no
//! logging, no locks.

use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, VK_CONTROL, VK_MENU, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
    TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL,
    WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
};

use super::{KeyEvent, KeyInjector, Modifiers};

const PUMP_STOP_TIMEOUT: Duration = Duration::from_secs(2);

// The hook procedure is a free function; it reaches its collaborators
// through these process-wide cells. Only one hook instance can exist.
static INJECTOR: OnceLock<KeyInjector> = OnceLock::new();
static HOOK_HANDLE: AtomicIsize = AtomicIsize::new(0);
static READER_VK: AtomicU32 = AtomicU32::new(super::vk::INSERT);

pub struct KeyboardHook {
    thread: Option<JoinHandle<()>>,
    thread_id: u32,
}

impl KeyboardHook {
    /// Installs the process-global hook on a dedicated pump thread.
    ///
    /// Installation can fail (insufficient privileges, OS refusal); the
    /// caller should log and continue without input rather than exit.
    pub fn install(injector: KeyInjector, reader_vk: u32) -> Result<Self> {
        INJECTOR
            .set(injector)
            .map_err(|_| anyhow!("keyboard hook is already installed"))?;
        READER_VK.store(reader_vk, Ordering::Relaxed);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();

        let thread = std::thread::Builder::new()
            .name("ariavox-kbhook".to_string())
            .spawn(move || unsafe {
                let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), None, 0) {
                    Ok(hook) => hook,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("SetWindowsHookExW failed: {e}")));
                        return;
                    }
                };
                HOOK_HANDLE.store(hook.0 as isize, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(GetCurrentThreadId()));

                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).into() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }

                HOOK_HANDLE.store(0, Ordering::SeqCst);
                if let Err(e) = UnhookWindowsHookEx(hook) {
                    error!("UnhookWindowsHookEx failed: {e}");
                }
            })
            .context("Failed to spawn hook thread")?;

        let thread_id = ready_rx
            .recv()
            .context("Hook thread exited before reporting")??;

        info!("Low-level keyboard hook installed");
        Ok(Self {
            thread: Some(thread),
            thread_id,
        })
    }

    /// Updates which key acts as the screen-reader modifier.
    pub fn set_reader_vk(&self, reader_vk: u32) {
        READER_VK.store(reader_vk, Ordering::Relaxed);
    }

    /// Stops the pump and removes the hook, waiting up to two seconds.
    pub fn uninstall(mut self) {
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if let Some(thread) = self.thread.take() {
            let deadline = std::time::Instant::now() + PUMP_STOP_TIMEOUT;
            while !thread.is_finished() && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if thread.is_finished() {
                let _ = thread.join();
                info!("Keyboard hook removed");
            } else {
                warn!("Hook pump did not stop within {:?}", PUMP_STOP_TIMEOUT);
            }
        }
    }
}

/// The hook callback. Hot path: no allocation, no logging, no locks.
unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let hook = HHOOK(HOOK_HANDLE.load(Ordering::Relaxed) as *mut _);

    // Contract: negative codes must pass straight through.
    if code < 0 {
        return CallNextHookEx(hook, code, wparam, lparam);
    }

    let kbd = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
    let pressed = matches!(wparam.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN);

    let mut modifiers = Modifiers::empty();
    if GetAsyncKeyState(VK_SHIFT.0 as i32) < 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if GetAsyncKeyState(VK_CONTROL.0 as i32) < 0 {
        modifiers |= Modifiers::CTRL;
    }
    if GetAsyncKeyState(VK_MENU.0 as i32) < 0 {
        modifiers |= Modifiers::ALT;
    }
    if GetAsyncKeyState(READER_VK.load(Ordering::Relaxed) as i32) < 0 {
        modifiers |= Modifiers::READER;
    }

    if let Some(injector) = INJECTOR.get() {
        injector.inject(KeyEvent {
            vk: kbd.vkCode,
            modifiers,
            pressed,
            time_ms: kbd.time,
        });
    }

    CallNextHookEx(hook, code, wparam, lparam)
}
