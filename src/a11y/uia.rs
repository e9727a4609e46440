//! UI Automation event registration (Windows).
//!
//! The platform counterpart to the keyboard hook: this is where the
//! pipeline subscribes to focus, structure, property, live-region, and
//! notification events. Registration runs on the accessibility worker, so
//! the automation object, the cache request, and the handler registrations
//! all live and die on that single thread. UI Automation invokes the
//! handlers on its own callback threads; their bodies only read the cached
//! property batch and hand value events to the translator.

use std::cell::RefCell;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use windows::core::{implement, BSTR};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER, SAFEARRAY};
use windows::Win32::System::Ole::SafeArrayDestroy;
use windows::Win32::System::Variant::{VARIANT, VT_BSTR, VT_I4};
use windows::Win32::UI::Accessibility::{
    CUIAutomation, IUIAutomation, IUIAutomation5, IUIAutomationElement,
    IUIAutomationEventHandler, IUIAutomationEventHandler_Impl,
    IUIAutomationFocusChangedEventHandler, IUIAutomationFocusChangedEventHandler_Impl,
    IUIAutomationNotificationEventHandler, IUIAutomationNotificationEventHandler_Impl,
    IUIAutomationPropertyChangedEventHandler, IUIAutomationPropertyChangedEventHandler_Impl,
    IUIAutomationStructureChangedEventHandler, IUIAutomationStructureChangedEventHandler_Impl,
    NotificationKind, NotificationProcessing, StructureChangeType, TreeScope_Subtree,
    UIA_AriaPropertiesPropertyId, UIA_AriaRolePropertyId, UIA_ControlTypePropertyId,
    UIA_EVENT_ID, UIA_ExpandCollapseExpandCollapseStatePropertyId,
    UIA_IsKeyboardFocusablePropertyId, UIA_LiveRegionChangedEventId,
    UIA_LiveSettingPropertyId, UIA_NamePropertyId, UIA_PROPERTY_ID, UIA_RuntimeIdPropertyId,
};

use super::events::{CachedProperties, EventTranslator};
use super::host::AccessibilityHost;
use crate::events::{Politeness, PropertyKind};

/// LiveSetting value meaning assertive; anything else is treated polite.
const LIVE_SETTING_ASSERTIVE: i32 = 2;

thread_local! {
    // Owned by the accessibility worker; never leaves it.
    static ACTIVE: RefCell<Option<Registration>> = const { RefCell::new(None) };
}

struct Registration {
    automation: IUIAutomation,
}

/// Registers all event handlers with UI Automation, marshalled onto the
/// accessibility worker. Idempotence is the caller's problem; calling this
/// twice replaces nothing and registers duplicate handlers.
pub async fn register(host: &AccessibilityHost, translator: Arc<EventTranslator>) -> Result<()> {
    host.run(move || register_on_worker(translator)).await??;
    info!("UI Automation event handlers registered");
    Ok(())
}

/// Removes every handler registered by [`register`], on the same worker.
pub async fn unregister(host: &AccessibilityHost) -> Result<()> {
    host.run(|| {
        ACTIVE.with(|cell| -> Result<()> {
            if let Some(registration) = cell.borrow_mut().take() {
                unsafe {
                    registration
                        .automation
                        .RemoveAllEventHandlers()
                        .context("RemoveAllEventHandlers failed")?;
                }
            }
            Ok(())
        })
    })
    .await??;
    info!("UI Automation event handlers removed");
    Ok(())
}

fn register_on_worker(translator: Arc<EventTranslator>) -> Result<()> {
    unsafe {
        let automation: IUIAutomation =
            CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER)
                .context("UI Automation instantiation failed")?;
        let root = automation
            .GetRootElement()
            .context("GetRootElement failed")?;

        // One cache request shared by every subscription: callbacks must
        // never go back to the provider for properties.
        let cache = automation
            .CreateCacheRequest()
            .context("CreateCacheRequest failed")?;
        for property in [
            UIA_RuntimeIdPropertyId,
            UIA_NamePropertyId,
            UIA_ControlTypePropertyId,
            UIA_AriaRolePropertyId,
            UIA_AriaPropertiesPropertyId,
            UIA_IsKeyboardFocusablePropertyId,
            UIA_LiveSettingPropertyId,
        ] {
            cache.AddProperty(property).context("AddProperty failed")?;
        }

        let focus: IUIAutomationFocusChangedEventHandler = FocusHandler {
            translator: translator.clone(),
        }
        .into();
        automation
            .AddFocusChangedEventHandler(&cache, &focus)
            .context("Focus handler registration failed")?;

        let structure: IUIAutomationStructureChangedEventHandler = StructureHandler {
            translator: translator.clone(),
        }
        .into();
        automation
            .AddStructureChangedEventHandler(&root, TreeScope_Subtree, &cache, &structure)
            .context("Structure handler registration failed")?;

        let properties: IUIAutomationPropertyChangedEventHandler = PropertyHandler {
            translator: translator.clone(),
        }
        .into();
        automation
            .AddPropertyChangedEventHandlerNativeArray(
                &root,
                TreeScope_Subtree,
                &cache,
                &properties,
                &[
                    UIA_NamePropertyId,
                    UIA_ExpandCollapseExpandCollapseStatePropertyId,
                ],
            )
            .context("Property handler registration failed")?;

        let live: IUIAutomationEventHandler = LiveRegionHandler {
            translator: translator.clone(),
        }
        .into();
        automation
            .AddAutomationEventHandler(
                UIA_LiveRegionChangedEventId,
                &root,
                TreeScope_Subtree,
                &cache,
                &live,
            )
            .context("Live-region handler registration failed")?;

        // Notification events need the newer automation interface; older
        // systems simply go without them.
        match automation.cast::<IUIAutomation5>() {
            Ok(automation5) => {
                let notification: IUIAutomationNotificationEventHandler =
                    NotificationHandler { translator }.into();
                automation5
                    .AddNotificationEventHandler(&root, TreeScope_Subtree, &cache, &notification)
                    .context("Notification handler registration failed")?;
            }
            Err(e) => debug!("Notification events unavailable: {e}"),
        }

        ACTIVE.with(|cell| *cell.borrow_mut() = Some(Registration { automation }));
    }
    Ok(())
}

#[implement(IUIAutomationFocusChangedEventHandler)]
struct FocusHandler {
    translator: Arc<EventTranslator>,
}

impl IUIAutomationFocusChangedEventHandler_Impl for FocusHandler {
    fn HandleFocusChangedEvent(
        &self,
        sender: Option<&IUIAutomationElement>,
    ) -> windows::core::Result<()> {
        let properties = match sender {
            Some(element) => cached_properties(element),
            None => Err(anyhow::anyhow!("focus event without an element")),
        };
        self.translator.on_focus_changed(properties);
        Ok(())
    }
}

#[implement(IUIAutomationStructureChangedEventHandler)]
struct StructureHandler {
    translator: Arc<EventTranslator>,
}

impl IUIAutomationStructureChangedEventHandler_Impl for StructureHandler {
    fn HandleStructureChangedEvent(
        &self,
        sender: Option<&IUIAutomationElement>,
        _changetype: StructureChangeType,
        _runtimeid: *const SAFEARRAY,
    ) -> windows::core::Result<()> {
        if let Some(element) = sender {
            let runtime_id = runtime_id_of(element);
            if !runtime_id.is_empty() {
                self.translator.on_structure_changed(runtime_id);
            }
        }
        Ok(())
    }
}

#[implement(IUIAutomationPropertyChangedEventHandler)]
struct PropertyHandler {
    translator: Arc<EventTranslator>,
}

impl IUIAutomationPropertyChangedEventHandler_Impl for PropertyHandler {
    fn HandlePropertyChangedEvent(
        &self,
        sender: Option<&IUIAutomationElement>,
        propertyid: UIA_PROPERTY_ID,
        newvalue: &VARIANT,
    ) -> windows::core::Result<()> {
        let Some(element) = sender else {
            return Ok(());
        };
        let property = if propertyid == UIA_NamePropertyId {
            PropertyKind::Name
        } else if propertyid == UIA_ExpandCollapseExpandCollapseStatePropertyId {
            PropertyKind::ExpandCollapseState
        } else {
            return Ok(());
        };
        let value = unsafe { variant_to_string(newvalue) };
        self.translator
            .on_property_changed(runtime_id_of(element), property, value);
        Ok(())
    }
}

#[implement(IUIAutomationEventHandler)]
struct LiveRegionHandler {
    translator: Arc<EventTranslator>,
}

impl IUIAutomationEventHandler_Impl for LiveRegionHandler {
    fn HandleAutomationEvent(
        &self,
        sender: Option<&IUIAutomationElement>,
        _eventid: UIA_EVENT_ID,
    ) -> windows::core::Result<()> {
        let Some(element) = sender else {
            return Ok(());
        };
        let source_id = runtime_id_of(element)
            .iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let text = unsafe {
            element
                .CachedName()
                .map(|name| name.to_string())
                .unwrap_or_default()
        };
        self.translator
            .on_live_region_changed(source_id, text, live_setting_of(element));
        Ok(())
    }
}

#[implement(IUIAutomationNotificationEventHandler)]
struct NotificationHandler {
    translator: Arc<EventTranslator>,
}

impl IUIAutomationNotificationEventHandler_Impl for NotificationHandler {
    fn HandleNotificationEvent(
        &self,
        _sender: Option<&IUIAutomationElement>,
        _notificationkind: NotificationKind,
        _notificationprocessing: NotificationProcessing,
        displaystring: &BSTR,
        _activityid: &BSTR,
    ) -> windows::core::Result<()> {
        let text = displaystring.to_string();
        if !text.is_empty() {
            self.translator.on_notification(text);
        }
        Ok(())
    }
}

/// Reads the cached property batch off an element. Any failed read aborts
/// the batch; the translator degrades to a minimal event.
fn cached_properties(element: &IUIAutomationElement) -> Result<CachedProperties> {
    unsafe {
        Ok(CachedProperties {
            runtime_id: runtime_id_of(element),
            name: element.CachedName().context("CachedName failed")?.to_string(),
            control_type_id: element
                .CachedControlType()
                .context("CachedControlType failed")?
                .0,
            aria_role: element
                .CachedAriaRole()
                .context("CachedAriaRole failed")?
                .to_string(),
            aria_properties: element
                .CachedAriaProperties()
                .context("CachedAriaProperties failed")?
                .to_string(),
            focusable: element
                .CachedIsKeyboardFocusable()
                .map(|b| b.as_bool())
                .unwrap_or(false),
        })
    }
}

fn runtime_id_of(element: &IUIAutomationElement) -> Vec<i32> {
    unsafe {
        match element.GetRuntimeId() {
            Ok(array) => {
                let id = int_safearray_to_vec(array);
                let _ = SafeArrayDestroy(array);
                id
            }
            Err(_) => Vec::new(),
        }
    }
}

unsafe fn int_safearray_to_vec(array: *mut SAFEARRAY) -> Vec<i32> {
    if array.is_null() {
        return Vec::new();
    }
    let array = &*array;
    if array.cDims != 1 || array.pvData.is_null() {
        return Vec::new();
    }
    let count = array.rgsabound[0].cElements as usize;
    let data = array.pvData as *const i32;
    (0..count).map(|i| *data.add(i)).collect()
}

fn live_setting_of(element: &IUIAutomationElement) -> Politeness {
    unsafe {
        match element.GetCachedPropertyValue(UIA_LiveSettingPropertyId) {
            Ok(value) if variant_to_i32(&value) == Some(LIVE_SETTING_ASSERTIVE) => {
                Politeness::Assertive
            }
            _ => Politeness::Polite,
        }
    }
}

unsafe fn variant_to_string(value: &VARIANT) -> String {
    let inner = &value.Anonymous.Anonymous;
    if inner.vt == VT_BSTR {
        inner.Anonymous.bstrVal.to_string()
    } else {
        String::new()
    }
}

unsafe fn variant_to_i32(value: &VARIANT) -> Option<i32> {
    let inner = &value.Anonymous.Anonymous;
    (inner.vt == VT_I4).then(|| inner.Anonymous.lVal)
}
