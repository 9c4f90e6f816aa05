use std::any::Any;
use std::cell::RefCell;
use std::thread::LocalKey;

/// A workspace that contains type-erased objects.
///
/// Element loops run on the rayon pool, so every worker thread keeps its own workspace with
/// the buffers (interface points, side node lists, scatter permutations) reused across
/// elements.
#[derive(Debug, Default)]
pub struct Workspace {
    workspaces: Vec<Box<dyn Any>>,
}

impl Workspace {
    pub fn get_or_insert_with<W, F>(&mut self, create: F) -> &mut W
    where
        W: 'static,
        F: FnOnce() -> W,
    {
        // Searched from the back, the most recently used buffer is kept last
        let idx = match self.workspaces.iter().rposition(|ws| ws.is::<W>()) {
            Some(idx) => idx,
            None => {
                self.workspaces.push(Box::new(create()) as Box<dyn Any>);
                self.workspaces.len() - 1
            }
        };
        let last = self.workspaces.len() - 1;
        self.workspaces.swap(idx, last);

        self.workspaces[last]
            .downcast_mut()
            .expect("Internal error: Downcasting can by definition not fail")
    }

    pub fn get_or_default<W>(&mut self) -> &mut W
    where
        W: 'static + Default,
    {
        self.get_or_insert_with(Default::default)
    }
}

/// Declares a thread-local [`Workspace`] with the given name.
#[macro_export]
macro_rules! define_thread_local_workspace {
    ($variable_name:ident) => {
        thread_local! {
            static $variable_name: std::cell::RefCell<$crate::workspace::Workspace>
                = std::cell::RefCell::new($crate::workspace::Workspace::default());
        }
    };
}

/// Runs `f` with the buffer of type `W` stored in the thread-local workspace.
///
/// Panics if called recursively for the same workspace.
pub fn with_thread_local_workspace<W, T, F>(workspace: &'static LocalKey<RefCell<Workspace>>, f: F) -> T
where
    W: 'static + Default,
    F: FnOnce(&mut W) -> T,
{
    workspace.with(|refcell| {
        let mut ws = refcell.borrow_mut();
        f(ws.get_or_default())
    })
}
