//! Event listeners on [`Element`].
//!
//! A listener is a multi-fire registry entry plus a client-side
//! `addEventListener` whose handler calls `callbackWs(id, {...})`.  The entry
//! is removed when the element's cleanup scope ends, or by [`Element::off`].
//! Late callbacks for a removed id are dropped by the session.
//!
//! Immediate listeners run injected script on the client and never call
//! back.

use std::sync::Arc;

use serde_json::Value;

use crate::application::dispatcher::js_string;
use crate::application::element::Element;
use crate::application::error::DomError;

/// Name of the custom event dispatched by a key-specific keyup handler.
pub const KEY_SPECIFIC_KEYUP_EVENT: &str = "keySpecificKeyUpEvent";

/// Event fields delivered to key-specific keyup listeners.
pub const KEY_SPECIFIC_KEYUP_FIELDS: &[&str] = &["type", "detail"];

const KEY_SPECIFIC_KEYUP_FLAG: &str = "enterPressedEventAttached";

/// Key under which the value of `retrieve_js` is delivered.
pub const RETRIEVED_KEY: &str = "retrieved";

impl Element {
    /// Attaches a listener for `event`.
    ///
    /// Each time it fires, `callback` receives an object with the requested
    /// event `fields`, plus the value of `retrieve_js` under
    /// [`RETRIEVED_KEY`] when one is given.  Returns the callback id, which
    /// can be passed to [`off`](Self::off).
    pub fn on<F>(&self, event: &str, fields: &[&str], retrieve_js: Option<&str>, callback: F) -> u64
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let session = self.session();
        let callback_id = session.next_callback_id();
        let js = format!(
            "{}.addEventListener({}, function(event) {{ callbackWs({callback_id}, {}); }});",
            self.js_expression(),
            js_string(event),
            event_object(fields, retrieve_js),
        );
        session.execute_with_callback(&js, callback_id, Arc::new(callback));

        let registry = Arc::clone(session.registry());
        self.cleanup_scope().on_cleanup(move || {
            registry.remove(callback_id);
        });
        callback_id
    }

    /// Removes a listener registered with [`on`](Self::on).  The client-side
    /// handler stays attached; its callbacks are ignored from now on.
    pub fn off(&self, callback_id: u64) -> bool {
        self.session().remove_callback(callback_id)
    }

    /// Attaches a listener whose body is `js`, run on the client with
    /// `event` in scope.  Nothing is sent back to the server.
    pub fn add_immediate_listener(&self, event: &str, js: &str) {
        self.execute(&format!(
            "{}.addEventListener({}, function(event) {{ {js} }});",
            self.js_expression(),
            js_string(event),
        ));
    }

    /// Makes the element dispatch a `keySpecificKeyUpEvent` when one of
    /// `keys` is released.  The pressed key is in `event.detail.key`.
    ///
    /// # Errors
    ///
    /// [`DomError::NoKeys`] if `keys` is empty, and
    /// [`DomError::DuplicateFlag`] if this element already has the handler.
    pub fn attach_key_specific_keyup(&self, keys: &[&str]) -> Result<(), DomError> {
        if keys.is_empty() {
            return Err(DomError::NoKeys);
        }
        if !self.session().set_flag(self.flag(KEY_SPECIFIC_KEYUP_FLAG)) {
            return Err(DomError::DuplicateFlag("attach_key_specific_keyup"));
        }
        let keys = Value::from(keys.to_vec());
        self.execute(&format!(
            "{{ const el = {expr}; const keys = {keys}; \
             el.addEventListener(\"keyup\", function(origEvent) {{ \
             if (keys.includes(origEvent.key)) {{ \
             el.dispatchEvent(new CustomEvent({name}, {{ detail: {{ key: origEvent.key }} }})); \
             }} }}); }}",
            expr = self.js_expression(),
            name = js_string(KEY_SPECIFIC_KEYUP_EVENT),
        ));
        Ok(())
    }

    /// Listens for the events set up by
    /// [`attach_key_specific_keyup`](Self::attach_key_specific_keyup).
    ///
    /// # Errors
    ///
    /// [`DomError::MissingFlag`] if the keyup handler is not attached.
    pub fn on_key_specific_keyup<F>(&self, callback: F) -> Result<u64, DomError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.require_key_specific_keyup()?;
        Ok(self.on(KEY_SPECIFIC_KEYUP_EVENT, KEY_SPECIFIC_KEYUP_FIELDS, None, callback))
    }

    /// Immediate variant of [`on_key_specific_keyup`](Self::on_key_specific_keyup).
    pub fn on_key_specific_keyup_immediate(&self, js: &str) -> Result<(), DomError> {
        self.require_key_specific_keyup()?;
        self.add_immediate_listener(KEY_SPECIFIC_KEYUP_EVENT, js);
        Ok(())
    }

    fn require_key_specific_keyup(&self) -> Result<(), DomError> {
        if self.session().has_flag(&self.flag(KEY_SPECIFIC_KEYUP_FLAG)) {
            Ok(())
        } else {
            Err(DomError::MissingFlag("attach_key_specific_keyup"))
        }
    }
}

/// The object literal a listener sends back: `{"f": event.f, ...}`.
fn event_object(fields: &[&str], retrieve_js: Option<&str>) -> String {
    let mut entries: Vec<String> = fields
        .iter()
        .map(|field| format!("{}: event.{field}", js_string(field)))
        .collect();
    if let Some(js) = retrieve_js {
        entries.push(format!("{}: ({js})", js_string(RETRIEVED_KEY)));
    }
    format!("{{{}}}", entries.join(", "))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
