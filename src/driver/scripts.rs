//! JavaScript snippets injected through `execute_script` / `execute_on`.
//!
//! Element-scoped snippets receive the element as `arguments[0]`.

/// Enumerates actionable nodes in the top document and every iframe.
///
/// `arguments[0]` is the catalog generation, `arguments[1]` the selector list.
/// Each node is stamped with `data-webpilot-ref="<generation>:<key>"`.
pub const SCAN_DOCUMENT: &str = r#"
const generation = arguments[0];
const selectors = arguments[1];
function attr(el, name) {
  const v = el.getAttribute(name);
  return v === null ? null : String(v);
}
function collect(doc, prefix) {
  const out = [];
  const nodes = Array.from(doc.querySelectorAll(selectors));
  nodes.forEach(function (el, n) {
    try {
      const rect = el.getBoundingClientRect();
      const style = doc.defaultView.getComputedStyle(el);
      const key = prefix + n;
      el.setAttribute('data-webpilot-ref', generation + ':' + key);
      out.push({
        key: key,
        tag: el.tagName.toLowerCase(),
        text: (el.textContent || '').trim().substring(0, 200),
        aria_label: attr(el, 'aria-label'),
        placeholder: attr(el, 'placeholder'),
        title: attr(el, 'title'),
        alt: attr(el, 'alt'),
        value: el.value !== undefined && el.value !== null ? String(el.value) : attr(el, 'value'),
        rect: { x: rect.left, y: rect.top, width: rect.width, height: rect.height },
        hidden: style.visibility === 'hidden' || style.display === 'none',
        has_click_handler: !!(el.onclick || el.getAttribute('onclick')),
        attributes: {
          id: el.id || '',
          class: typeof el.className === 'string' ? el.className : '',
          name: attr(el, 'name') || '',
          type: attr(el, 'type') || '',
          role: attr(el, 'role') || ''
        }
      });
    } catch (e) {}
  });
  return out;
}
const frames = [];
Array.from(document.querySelectorAll('iframe')).forEach(function (frame, index) {
  const r = frame.getBoundingClientRect();
  let doc = null;
  try { doc = frame.contentDocument; } catch (e) { doc = null; }
  frames.push({
    index: index,
    offset: { x: r.left, y: r.top, width: r.width, height: r.height },
    accessible: !!doc,
    nodes: doc ? collect(doc, 'f' + index + '-') : []
  });
});
return {
  viewport: { width: window.innerWidth, height: window.innerHeight },
  nodes: collect(document, 'm-'),
  frames: frames
};
"#;

pub const ROOT_READY: &str = "return !!document.body;";

pub const READY_STATE: &str = "return document.readyState;";

pub const SCROLL_INTO_VIEW: &str =
    "arguments[0].scrollIntoView({block: 'center', inline: 'center'});";

pub const SCRIPTED_CLICK: &str = "arguments[0].click();";

/// `arguments[1]` is the mouse event type (click, dblclick, contextmenu, mouseover).
pub const DISPATCH_MOUSE_EVENT: &str = r#"
const el = arguments[0];
const type = arguments[1];
const rect = el.getBoundingClientRect();
el.dispatchEvent(new MouseEvent(type, {
  view: window, bubbles: true, cancelable: true,
  clientX: rect.left + rect.width / 2, clientY: rect.top + rect.height / 2,
  button: type === 'contextmenu' ? 2 : 0
}));
"#;

pub const FOCUS: &str = "arguments[0].focus();";

pub const DISPATCH_INPUT_CHANGE: &str = r#"
const el = arguments[0];
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
"#;

/// Last-resort text entry: assign the value directly. `arguments[1]` is the text.
pub const ASSIGN_VALUE: &str = r#"
const el = arguments[0];
if (el.isContentEditable) { el.textContent = arguments[1]; } else { el.value = arguments[1]; }
el.dispatchEvent(new Event('input', { bubbles: true }));
"#;

/// Returns true when an option matched by text, value or index was selected.
pub const SELECT_OPTION: &str = r#"
const el = arguments[0];
const choice = String(arguments[1]);
if (!el.options) { return false; }
const opts = Array.from(el.options);
let idx = opts.findIndex(function (o) { return o.text.trim() === choice.trim(); });
if (idx < 0) { idx = opts.findIndex(function (o) { return o.value === choice; }); }
if (idx < 0 && /^\d+$/.test(choice)) {
  const n = parseInt(choice, 10);
  if (n >= 0 && n < opts.length) { idx = n; }
}
if (idx < 0) { return false; }
el.selectedIndex = idx;
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

pub const TEXT_CONTENT: &str =
    "const el = arguments[0]; return (el.textContent || el.value || '').trim();";

/// `arguments[0]` / `arguments[1]` are the horizontal / vertical deltas.
pub const SCROLL_BY: &str = "window.scrollBy(arguments[0], arguments[1]);";

/// Ticks a visible verification-challenge checkbox. Returns true when one was clicked.
pub const CHALLENGE_CHECKBOX: &str = r#"
const selectors = [
  "input[type='checkbox'][name='cf-turnstile-response']",
  ".cf-turnstile input[type='checkbox']",
  "input[type='checkbox'][id*='turnstile']",
  "input[type='checkbox'][class*='turnstile']",
  ".challenge-form input[type='checkbox']",
  "[data-callback] input[type='checkbox']"
];
function visible(el) {
  const r = el.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
}
for (const sel of selectors) {
  const box = document.querySelector(sel);
  if (box && visible(box) && !box.checked) { box.click(); return true; }
}
const needle = 'verify you are human';
const labels = Array.from(document.querySelectorAll('label, span, div, p'))
  .filter(function (el) { return (el.textContent || '').toLowerCase().includes(needle); });
for (const label of labels) {
  const scope = label.closest('form, div') || label.parentElement;
  const box = scope ? scope.querySelector("input[type='checkbox']") : null;
  if (box && visible(box) && !box.checked) { box.click(); return true; }
}
return false;
"#;

/// Clicks close/dismiss/accept controls of overlays. Returns how many were clicked.
pub const DISMISS_POPUPS: &str = r##"
const selectors = [
  "button[aria-label*='close' i]",
  "button[aria-label*='dismiss' i]",
  ".modal-close", ".popup-close", ".close-button",
  "[class*='cookie'] button[class*='accept' i]",
  "#onetrust-accept-btn-handler",
  "[class*='dismiss']"
];
let clicked = 0;
for (const sel of selectors) {
  for (const el of Array.from(document.querySelectorAll(sel))) {
    const r = el.getBoundingClientRect();
    if (r.width > 0 && r.height > 0) {
      try { el.click(); clicked += 1; } catch (e) {}
    }
  }
}
return clicked;
"##;

pub const PAGE_DATA: &str = r#"
const headings = Array.from(document.querySelectorAll('h1, h2, h3'))
  .map(function (h) { return (h.textContent || '').trim(); })
  .filter(function (t) { return t.length > 0; })
  .slice(0, 20);
const links = Array.from(document.querySelectorAll('a[href]'))
  .map(function (a) { return { text: (a.textContent || '').trim().substring(0, 80), href: a.href }; })
  .slice(0, 50);
return {
  headings: headings,
  links: links,
  link_count: document.querySelectorAll('a[href]').length,
  table_count: document.querySelectorAll('table').length,
  form_count: document.querySelectorAll('form').length,
  body_text: (document.body ? document.body.innerText : '').substring(0, 100000)
};
"#;

pub const PERFORMANCE_SAMPLE: &str = r#"
const t = performance.timing;
const mem = performance.memory || {};
return {
  load_ms: t.loadEventEnd > 0 ? t.loadEventEnd - t.navigationStart : null,
  dom_ready_ms: t.domContentLoadedEventEnd > 0 ? t.domContentLoadedEventEnd - t.navigationStart : null,
  js_heap_bytes: mem.usedJSHeapSize || null,
  resource_count: performance.getEntriesByType('resource').length
};
"#;
