// SPDX-License-Identifier: GPL-3.0-only

//! Application scene state machine
//!
//! Scenes move only along the edges of a fixed transition table:
//!
//! ```text
//! Boot -> Camera
//! Camera -> Settings | Gallery | Shutdown
//! Settings -> Camera | Shutdown
//! Gallery -> Camera | Shutdown
//! Shutdown (terminal)
//! ```
//!
//! A rejected transition leaves the machine untouched and fires no hook.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Application scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Boot,
    Camera,
    Settings,
    Gallery,
    Shutdown,
}

impl AppState {
    pub const ALL: [AppState; 5] = [
        AppState::Boot,
        AppState::Camera,
        AppState::Settings,
        AppState::Gallery,
        AppState::Shutdown,
    ];

    /// States reachable from `self` in one step
    pub fn successors(self) -> &'static [AppState] {
        match self {
            AppState::Boot => &[AppState::Camera],
            AppState::Camera => &[AppState::Settings, AppState::Gallery, AppState::Shutdown],
            AppState::Settings => &[AppState::Camera, AppState::Shutdown],
            AppState::Gallery => &[AppState::Camera, AppState::Shutdown],
            AppState::Shutdown => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Boot => "boot",
            AppState::Camera => "camera",
            AppState::Settings => "settings",
            AppState::Gallery => "gallery",
            AppState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive scene changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    BootComplete,
    OpenSettings,
    OpenGallery,
    BackToCamera,
    ShutdownRequest,
}

impl AppEvent {
    /// Scene the event asks for
    pub fn target(self) -> AppState {
        match self {
            AppEvent::BootComplete => AppState::Camera,
            AppEvent::OpenSettings => AppState::Settings,
            AppEvent::OpenGallery => AppState::Gallery,
            AppEvent::BackToCamera => AppState::Camera,
            AppEvent::ShutdownRequest => AppState::Shutdown,
        }
    }
}

/// Callback run on entering or leaving a scene; receives that scene
pub type StateHook = Box<dyn FnMut(AppState) + Send>;

/// Scene state machine with per-state enter/exit hooks
pub struct AppStateMachine {
    current: AppState,
    previous: Option<AppState>,
    enter_hooks: HashMap<AppState, StateHook>,
    exit_hooks: HashMap<AppState, StateHook>,
}

impl Default for AppStateMachine {
    fn default() -> Self {
        Self::new(AppState::Boot)
    }
}

impl fmt::Debug for AppStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppStateMachine")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

impl AppStateMachine {
    pub fn new(initial: AppState) -> Self {
        debug!(state = %initial, "Scene state machine initialised");
        Self {
            current: initial,
            previous: None,
            enter_hooks: HashMap::new(),
            exit_hooks: HashMap::new(),
        }
    }

    pub fn current(&self) -> AppState {
        self.current
    }

    pub fn previous(&self) -> Option<AppState> {
        self.previous
    }

    pub fn can_transition(&self, target: AppState) -> bool {
        self.current.successors().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.current.successors().is_empty()
    }

    /// Move to `target` if the table allows it
    ///
    /// Runs the exit hook of the current scene, updates current/previous, then
    /// runs the enter hook of `target`. Returns false for a rejected edge.
    pub fn transition(&mut self, target: AppState) -> bool {
        if !self.can_transition(target) {
            warn!(from = %self.current, to = %target, "Invalid scene transition");
            return false;
        }

        let from = self.current;
        if let Some(hook) = self.exit_hooks.get_mut(&from) {
            hook(from);
        }

        self.previous = Some(from);
        self.current = target;
        info!(from = %from, to = %target, "Scene transition");

        if let Some(hook) = self.enter_hooks.get_mut(&target) {
            hook(target);
        }
        true
    }

    /// Translate an event into its target scene and transition
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        debug!(?event, "Scene event");
        self.transition(event.target())
    }

    /// Register the enter hook for `state`, replacing any previous one
    pub fn on_enter(&mut self, state: AppState, hook: impl FnMut(AppState) + Send + 'static) {
        self.enter_hooks.insert(state, Box::new(hook));
    }

    /// Register the exit hook for `state`, replacing any previous one
    pub fn on_exit(&mut self, state: AppState, hook: impl FnMut(AppState) + Send + 'static) {
        self.exit_hooks.insert(state, Box::new(hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_table_edges() {
        let allowed = |from: AppState, to: AppState| from.successors().contains(&to);
        let mut edges = 0;
        for from in AppState::ALL {
            for to in AppState::ALL {
                let mut sm = AppStateMachine::new(from);
                let before = sm.current();
                let ok = sm.transition(to);
                assert_eq!(ok, allowed(from, to), "{from} -> {to}");
                if ok {
                    edges += 1;
                    assert_eq!(sm.current(), to);
                    assert_eq!(sm.previous(), Some(before));
                } else {
                    assert_eq!(sm.current(), before);
                    assert_eq!(sm.previous(), None);
                }
            }
        }
        assert_eq!(edges, 8);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut sm = AppStateMachine::new(AppState::Shutdown);
        for state in AppState::ALL {
            let f = Arc::clone(&fired);
            sm.on_enter(state, move |s| f.lock().unwrap().push(format!("enter {s}")));
            let f = Arc::clone(&fired);
            sm.on_exit(state, move |s| f.lock().unwrap().push(format!("exit {s}")));
        }

        assert!(sm.is_terminal());
        for target in AppState::ALL {
            assert!(!sm.transition(target));
        }
        assert!(!sm.handle_event(AppEvent::ShutdownRequest));
        assert!(!sm.handle_event(AppEvent::BackToCamera));
        assert_eq!(sm.current(), AppState::Shutdown);
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn test_shutdown_request_exits_each_scene_once() {
        for from in [AppState::Camera, AppState::Settings, AppState::Gallery] {
            let exits = Arc::new(Mutex::new(Vec::new()));
            let mut sm = AppStateMachine::new(from);
            for state in AppState::ALL {
                let e = Arc::clone(&exits);
                sm.on_exit(state, move |s| e.lock().unwrap().push(s));
            }

            assert!(sm.handle_event(AppEvent::ShutdownRequest), "{from}");
            assert_eq!(sm.current(), AppState::Shutdown);
            assert_eq!(sm.previous(), Some(from));
            assert_eq!(*exits.lock().unwrap(), [from], "{from}");
        }
    }

    #[test]
    fn test_boot_only_goes_to_camera() {
        let mut sm = AppStateMachine::default();
        assert!(!sm.handle_event(AppEvent::OpenSettings));
        assert!(!sm.handle_event(AppEvent::ShutdownRequest));
        assert!(sm.handle_event(AppEvent::BootComplete));
        assert_eq!(sm.current(), AppState::Camera);
        assert!(sm.handle_event(AppEvent::OpenGallery));
        assert!(sm.handle_event(AppEvent::BackToCamera));
        assert_eq!(sm.previous(), Some(AppState::Gallery));
    }

    #[test]
    fn test_hook_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sm = AppStateMachine::new(AppState::Camera);

        let l = Arc::clone(&log);
        sm.on_exit(AppState::Camera, move |s| l.lock().unwrap().push(format!("exit {s}")));
        let l = Arc::clone(&log);
        sm.on_enter(AppState::Settings, move |s| l.lock().unwrap().push(format!("enter {s}")));

        assert!(sm.handle_event(AppEvent::OpenSettings));
        assert_eq!(*log.lock().unwrap(), ["exit camera", "enter settings"]);
    }

    #[test]
    fn test_rejected_transition_fires_no_hook() {
        let fired = Arc::new(Mutex::new(0));
        let mut sm = AppStateMachine::new(AppState::Settings);
        let f = Arc::clone(&fired);
        sm.on_exit(AppState::Settings, move |_| *f.lock().unwrap() += 1);
        let f = Arc::clone(&fired);
        sm.on_enter(AppState::Gallery, move |_| *f.lock().unwrap() += 1);

        assert!(!sm.transition(AppState::Gallery));
        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(sm.current(), AppState::Settings);
    }

    #[test]
    fn test_later_hook_replaces_earlier() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sm = AppStateMachine::new(AppState::Boot);
        let l = Arc::clone(&log);
        sm.on_enter(AppState::Camera, move |_| l.lock().unwrap().push("first"));
        let l = Arc::clone(&log);
        sm.on_enter(AppState::Camera, move |_| l.lock().unwrap().push("second"));

        sm.handle_event(AppEvent::BootComplete);
        assert_eq!(*log.lock().unwrap(), ["second"]);
    }
}
