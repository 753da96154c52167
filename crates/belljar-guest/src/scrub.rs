//! The startup scrub program.
//!
//! Before any globals are installed, the guest context evaluates a program
//! that removes the identifying and escape-capable surface its engine ships.
//! The program walks the execution context's own prototype chain
//! (`globalThis` → prototype → … → null) and pins every scrub-listed name it
//! finds as an *own* property, at the level where it was found, to an inert
//! `undefined`. Patching only the top object would not be enough: values
//! reachable through prototype getters stay recoverable via
//! `getPrototypeOf` walks or descriptor reflection, so every level of the
//! chain is treated.
//!
//! Dynamic-function constructors get the same treatment through their
//! prototypes, since `(function(){}).constructor` would otherwise rebuild an
//! evaluation surface with a fresh, unscrubbed view of the scope.

/// Names pinned to `undefined` wherever they appear on the prototype chain.
///
/// Four categories: ambient name/self identifiers, network/location
/// revealing globals, animation-timing globals (refresh-rate fingerprints),
/// and constructors able to spawn a nested evaluation context that would not
/// inherit this scrubbing. Names the engine does not ship are skipped by the
/// own-property check.
pub const SCRUBBED_GLOBALS: &[&str] = &[
    "name",
    "self",
    "location",
    "origin",
    "requestAnimationFrame",
    "cancelAnimationFrame",
    "Worker",
    "SharedWorker",
    "importScripts",
    "eval",
    "Function",
];

/// Build the canonical startup program.
///
/// Delivered to the guest in the relay init envelope and evaluated exactly
/// once, before `install`.
pub fn startup_source() -> String {
    let blocked = SCRUBBED_GLOBALS
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"(() => {{
  "use strict";
  const blocked = [{blocked}];
  const protos = [
    Object.getPrototypeOf(function () {{}}),
    Object.getPrototypeOf(async function () {{}}),
    Object.getPrototypeOf(function* () {{}}),
  ];
  let target = globalThis;
  while (target !== null) {{
    for (let i = 0; i < blocked.length; i += 1) {{
      if (Object.getOwnPropertyDescriptor(target, blocked[i]) !== undefined) {{
        try {{
          Object.defineProperty(target, blocked[i], {{
            value: undefined,
            writable: false,
            enumerable: false,
            configurable: false,
          }});
        }} catch (_ignored) {{}}
      }}
    }}
    target = Object.getPrototypeOf(target);
  }}
  for (let i = 0; i < protos.length; i += 1) {{
    try {{
      Object.defineProperty(protos[i], "constructor", {{
        value: undefined,
        writable: false,
        enumerable: false,
        configurable: false,
      }});
    }} catch (_ignored) {{}}
  }}
}})();
"#
    )
}
