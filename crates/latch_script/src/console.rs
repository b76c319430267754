// console.rs - Script-to-native logging entry points
//
// `log(...)` and `print(...)` join their arguments with spaces, print the
// tagged line to stdout, mirror it as a tracing event and append it to the
// transcript.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function};
use tracing::info;

pub struct Console {
    tag: String,
    transcript: Rc<RefCell<Vec<String>>>,
}

impl Console {
    pub fn install(ctx: &Ctx<'_>, tag: impl Into<String>) -> rquickjs::Result<Self> {
        let console = Self {
            tag: tag.into(),
            transcript: Rc::default(),
        };

        let globals = ctx.globals();
        for name in ["log", "print"] {
            let tag = console.tag.clone();
            let transcript = Rc::clone(&console.transcript);
            let entry = Function::new(ctx.clone(), move |parts: Rest<Coerced<String>>| {
                let line = parts.0.into_iter().map(|part| part.0).collect::<Vec<_>>().join(" ");
                println!("[{tag}] {line}");
                info!(target: "script", %tag, "{line}");
                transcript.borrow_mut().push(line);
            })?;
            globals.set(name, entry)?;
        }

        Ok(console)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Lines written by scripts so far, oldest first.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.borrow().clone()
    }

    pub fn clear(&self) {
        self.transcript.borrow_mut().clear();
    }
}
