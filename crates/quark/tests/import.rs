//! `import` resolution, module-result caching, and the stdout capture path
//! (`Context::set_stdout`) used to observe that a cached import does not
//! re-run the module's side effects.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use quark::Context;

#[derive(Clone)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn temp_module_dir(name: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("quark-import-test-{name}-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

#[test]
fn import_caches_a_module_so_its_side_effects_run_once() {
    let dir = temp_module_dir("cache");
    std::fs::write(dir.join("counted.qk"), "print(\"loaded\")\nexport 42\n").unwrap();

    let mut ctx = Context::with_import_base(dir.clone());
    let buf = Rc::new(RefCell::new(Vec::new()));
    ctx.set_stdout(Box::new(SharedBuf(Rc::clone(&buf))));

    let result = ctx
        .run_source("<test>", "a = import(\"counted.qk\")\nb = import(\"counted.qk\")\nexport [a, b]\n")
        .unwrap();
    assert_eq!(result.display_string(), "[42, 42]");

    let printed = String::from_utf8(buf.borrow().clone()).unwrap();
    assert_eq!(printed, "loaded\n", "module body must run exactly once across both import() calls");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn import_of_a_missing_file_is_an_import_error() {
    let dir = temp_module_dir("missing");
    let mut ctx = Context::with_import_base(dir.clone());
    let err = ctx.run_source("<test>", "export import(\"does_not_exist.qk\")\n").unwrap_err();
    assert!(err.to_string().contains("import error"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn import_returns_a_callable_exported_closure() {
    let dir = temp_module_dir("shared");
    std::fs::write(dir.join("lib.qk"), "fn double(x){ return x * 2 }\nexport double\n").unwrap();

    let mut ctx = Context::with_import_base(dir.clone());
    let result = ctx.run_source("<test>", "double = import(\"lib.qk\")\nexport double(21)\n").unwrap();
    assert_eq!(result.display_string(), "42");

    let _ = std::fs::remove_dir_all(&dir);
}
