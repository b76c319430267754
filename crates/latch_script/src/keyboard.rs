//! Global `Keyboard` object exposed to scripts.

use std::rc::Rc;

use latch_services::InputSource;
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Function, Object};

/// Install `Keyboard.isKeyPressed(key)` backed by `input`.
pub fn install(ctx: &Ctx<'_>, input: Rc<dyn InputSource>) -> rquickjs::Result<()> {
    let keyboard = Object::new(ctx.clone())?;
    keyboard.set(
        "isKeyPressed",
        Function::new(ctx.clone(), move |key: Coerced<String>| input.is_key_pressed(&key.0))?,
    )?;
    ctx.globals().set("Keyboard", keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;
    use latch_services::Keyboard;

    #[test]
    fn scripts_poll_live_key_state() {
        let runtime = ScriptRuntime::new().unwrap();
        let keys = Rc::new(Keyboard::new());
        let input: Rc<dyn InputSource> = keys.clone();
        runtime.with(|ctx| install(&ctx, input)).unwrap();

        let poll = |src: &str| runtime.with(|ctx| ctx.eval::<bool, _>(src).unwrap());
        assert!(!poll("Keyboard.isKeyPressed('Esc')"));

        keys.press("Esc");
        assert!(poll("Keyboard.isKeyPressed('Esc')"));
        assert!(poll("Keyboard.isPressed === undefined"));

        keys.release("Esc");
        assert!(!poll("Keyboard.isKeyPressed('Esc')"));
    }
}
