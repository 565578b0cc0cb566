//! Builtin search commands. Each module exposes `command()`; `builtins()` lists them all.

mod autocast;
mod dedup;
mod delete;
mod drop_fields;
mod echo;
mod ensure_list;
mod eval;
mod explode;
mod fake_data;
mod filter;
mod head;
mod join;
mod last;
mod make_events;
mod rename;
mod search;
mod select;
mod set;
mod sort;
mod stats;
mod table;
mod update;

use crate::pipeline::registry::Command;

pub use search::parse_filter;
pub use table::encode_cell;

/// Every builtin command, under its default name
pub fn builtins() -> Vec<Command> {
    vec![
        search::command(),
        echo::command(),
        head::command(),
        table::command(),
        rename::command(),
        select::command(),
        drop_fields::command(),
        explode::command(),
        autocast::command(),
        ensure_list::command(),
        filter::command(),
        eval::command(),
        sort::command(),
        dedup::command(),
        stats::command(),
        join::command(),
        set::command(),
        make_events::command(),
        update::command(),
        delete::command(),
        last::command(),
        fake_data::command(),
    ]
}
