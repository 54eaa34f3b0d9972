//! Demonstration of a Store managing a todo list

use std::sync::Arc;

use statebox::{create, middleware::trace_candidates, snapshot, Step};

#[derive(Clone, Debug)]
struct TodoItem {
    id: usize,
    title: String,
    completed: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum TodoFilter {
    All,
    Active,
    Completed,
}

snapshot! {
    #[derive(Clone, Debug)]
    struct AppState => AppPatch {
        todos: Arc<Vec<TodoItem>>,
        filter: TodoFilter,
    }
}

impl AppState {
    fn new() -> Self {
        Self {
            todos: Arc::new(Vec::new()),
            filter: TodoFilter::All,
        }
    }

    fn add_todo(&self, title: &str) -> AppPatch {
        let mut todos = (*self.todos).clone();
        todos.push(TodoItem {
            id: todos.len(),
            title: title.to_string(),
            completed: false,
        });
        AppPatch::default().todos(Arc::new(todos))
    }

    fn toggle_todo(&self, id: usize) -> AppPatch {
        let mut todos = (*self.todos).clone();
        if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
            todo.completed = !todo.completed;
        }
        AppPatch::default().todos(Arc::new(todos))
    }

    fn filtered_todos(&self) -> Vec<&TodoItem> {
        match self.filter {
            TodoFilter::All => self.todos.iter().collect(),
            TodoFilter::Active => self.todos.iter().filter(|t| !t.completed).collect(),
            TodoFilter::Completed => self.todos.iter().filter(|t| t.completed).collect(),
        }
    }

    fn stats(&self) -> (usize, usize, usize) {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|t| t.completed).count();
        (total, total - completed, completed)
    }
}

fn main() -> statebox::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Store Example: Todo App ===\n");

    let store = create(AppState::new());
    store.register_middleware(trace_candidates());

    println!("1. Rejecting empty titles in middleware");
    store.use_middleware(|candidate: AppState| {
        if candidate.todos.iter().any(|t| t.title.trim().is_empty()) {
            println!("   [Middleware] empty title rejected");
            Step::Halt
        } else {
            Step::Continue(candidate)
        }
    });

    println!("\n2. Subscribing to stats and to the filter");
    store.subscribe(|state: &AppState| {
        let (total, active, completed) = state.stats();
        println!("   [Store Update] Total: {total}, Active: {active}, Completed: {completed}");
    });
    store.subscribe_selector(
        |state: &AppState| state.filter.clone(),
        |filter: &TodoFilter| println!("   [Filter] now {filter:?}"),
    );

    println!("\n3. Adding todos");
    store.set_state_with(|s| s.add_todo("Learn Rust"))?;
    store.set_state_with(|s| s.add_todo("Build a state container"))?;
    store.set_state_with(|s| s.add_todo("   "))?;
    store.set_state_with(|s| s.add_todo("Write documentation"))?;

    println!("\n4. Completing the first two todos");
    store.set_state_with(|s| s.toggle_todo(0))?;
    store.set_state_with(|s| s.toggle_todo(1))?;

    println!("\n5. Filtering to active todos");
    store.set_state(AppPatch::default().filter(TodoFilter::Active))?;
    store.with_state(|state| {
        for todo in state.filtered_todos() {
            println!("   [ ] {}", todo.title);
        }
    });

    println!("\n6. Filtering to completed todos");
    store.set_state(AppPatch::default().filter(TodoFilter::Completed))?;
    store.with_state(|state| {
        for todo in state.filtered_todos() {
            println!("   [x] {}", todo.title);
        }
    });

    let (total, active, completed) = store.with_state(|state| state.stats());
    println!("\n7. Final statistics after {} commits:", store.version());
    println!("   Total: {total}");
    println!("   Active: {active}");
    println!("   Completed: {completed}");

    Ok(())
}
