use std::future::Future;
use std::pin::Pin;

/// Boxed future that stays on the thread that created it.
///
/// Everything in the viewer runs on one cooperative event loop, so futures
/// are not required to be `Send`.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Hands a task to the single-threaded executor that drives the viewer.
///
/// In the browser this is `wasm_bindgen_futures::spawn_local`; natively it is
/// a `tokio::task::LocalSet`.
pub trait Spawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

impl<S: Spawner + ?Sized> Spawner for std::rc::Rc<S> {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        (**self).spawn_local(task)
    }
}

/// Spawns onto the current `tokio::task::LocalSet`.
///
/// Panics (inside tokio) if used outside a `LocalSet` context.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLocalSpawner;

#[cfg(feature = "tokio")]
impl Spawner for TokioLocalSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        drop(tokio::task::spawn_local(task));
    }
}
