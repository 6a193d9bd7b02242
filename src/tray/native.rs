//! Native status-area tray (macOS).
//!
//! The platform event loop must own the main thread, so the launcher itself
//! runs on a worker thread. Presentation updates reach the event loop as
//! user events; menu clicks leave it as [`TrayAction`]s.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
use winit::event::Event;
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};

use super::{TrayAction, TrayError, TrayGlyph, TrayHost, TrayLink, TrayView};
use crate::sysproxy::ProxyState;

const ICON_SIZE: u32 = 16;

enum TrayUpdate {
    Show(ProxyState),
    Present(ProxyState),
    Exit,
}

/// [`TrayView`] that forwards to the main-thread event loop.
struct EventLoopView {
    proxy: Mutex<EventLoopProxy<TrayUpdate>>,
}

impl EventLoopView {
    fn send(&self, update: TrayUpdate) {
        if self.proxy.lock().send_event(update).is_err() {
            tracing::debug!("Tray event loop already closed");
        }
    }
}

impl TrayView for EventLoopView {
    fn show(&self, state: ProxyState) {
        self.send(TrayUpdate::Show(state));
    }

    fn present(&self, state: ProxyState) {
        self.send(TrayUpdate::Present(state));
    }
}

fn glyph_icon(glyph: TrayGlyph) -> Result<Icon, TrayError> {
    let pixel: [u8; 4] = match glyph {
        TrayGlyph::Active => [0x00, 0xAA, 0x00, 0xFF],
        TrayGlyph::Inactive => [0x88, 0x88, 0x88, 0xFF],
    };
    let rgba: Vec<u8> = (0..ICON_SIZE * ICON_SIZE).flat_map(|_| pixel).collect();
    Icon::from_rgba(rgba, ICON_SIZE, ICON_SIZE).map_err(|e| TrayError::Icon(e.to_string()))
}

/// The icon and its menu. Lives on the main thread only.
struct NativeTray {
    icon: TrayIcon,
    toggle_item: MenuItem,
}

impl NativeTray {
    fn build(title: &str, state: ProxyState, actions: mpsc::UnboundedSender<TrayAction>) -> Result<Self, TrayError> {
        let menu = Menu::new();
        let toggle_item = MenuItem::new(state.menu_label(), true, None);
        let quit_item = MenuItem::new("Quit", true, None);

        menu.append(&toggle_item).map_err(|e| TrayError::Menu(e.to_string()))?;
        menu.append(&PredefinedMenuItem::separator())
            .map_err(|e| TrayError::Menu(e.to_string()))?;
        menu.append(&quit_item).map_err(|e| TrayError::Menu(e.to_string()))?;

        let toggle_id = toggle_item.id().clone();
        let quit_id = quit_item.id().clone();
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            let action = if event.id == toggle_id {
                TrayAction::ToggleProxy
            } else if event.id == quit_id {
                TrayAction::Quit
            } else {
                return;
            };
            tracing::debug!(?action, "Tray menu clicked");
            let _ = actions.send(action);
        }));

        let icon = TrayIconBuilder::new()
            .with_title(title)
            .with_tooltip("Disable/Enable system proxy")
            .with_icon(glyph_icon(state.glyph())?)
            .with_menu(Box::new(menu))
            .build()
            .map_err(|e| TrayError::Icon(e.to_string()))?;

        tracing::info!("Tray icon created");
        Ok(Self { icon, toggle_item })
    }

    fn present(&self, state: ProxyState) {
        match glyph_icon(state.glyph()) {
            Ok(icon) => {
                if let Err(e) = self.icon.set_icon(Some(icon)) {
                    tracing::warn!(error = %e, "Failed to update tray icon");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to render tray icon"),
        }
        self.toggle_item.set_text(state.menu_label());
    }
}

/// The platform event loop, opened on the main thread but not yet running.
pub struct NativeHost {
    event_loop: EventLoop<TrayUpdate>,
    title: String,
}

impl NativeHost {
    /// Fails when no window server is reachable.
    pub fn open(title: &str) -> Result<Self, TrayError> {
        let event_loop = EventLoopBuilder::<TrayUpdate>::with_user_event()
            .build()
            .map_err(|e| TrayError::EventLoop(e.to_string()))?;
        Ok(Self {
            event_loop,
            title: title.to_string(),
        })
    }
}

impl TrayHost for NativeHost {
    /// Run `body` on a worker thread while the event loop owns this thread.
    ///
    /// Returns `body`'s result once it finishes; the event loop exits with it.
    fn run<T, F>(self, body: F) -> Result<T, TrayError>
    where
        F: FnOnce(TrayLink) -> T + Send + 'static,
        T: Send + 'static,
    {
        let Self { event_loop, title } = self;
        let proxy = event_loop.create_proxy();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let view = Arc::new(EventLoopView {
            proxy: Mutex::new(proxy.clone()),
        });
        let link = TrayLink::new(view, action_rx);

        let worker = thread::Builder::new()
            .name("launcher".into())
            .spawn(move || {
                let result = body(link);
                let _ = proxy.send_event(TrayUpdate::Exit);
                result
            })
            .map_err(|e| TrayError::EventLoop(e.to_string()))?;

        let mut tray: Option<NativeTray> = None;
        let run = event_loop.run(move |event, target| {
            target.set_control_flow(ControlFlow::Wait);
            let Event::UserEvent(update) = event else {
                return;
            };

            match update {
                TrayUpdate::Show(state) => match NativeTray::build(&title, state, action_tx.clone()) {
                    Ok(built) => tray = Some(built),
                    Err(e) => tracing::error!(error = %e, "Failed to create tray icon"),
                },
                TrayUpdate::Present(state) => {
                    if let Some(tray) = &tray {
                        tray.present(state);
                    }
                }
                TrayUpdate::Exit => {
                    tray = None;
                    target.exit();
                }
            }
        });

        if let Err(e) = run {
            tracing::error!(error = %e, "Tray event loop failed");
        }

        worker
            .join()
            .map_err(|_| TrayError::EventLoop("launcher thread panicked".into()))
    }
}
