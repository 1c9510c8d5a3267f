use divan::{Bencher, black_box};
use grove::{Document, NodeId, TreeBuilder, TreeChangeEvent};

fn main() {
    divan::main();
}

/// A file of `blocks` blocks, each holding ten statements of three tokens.
fn sample(blocks: usize) -> (Document<u32>, Vec<NodeId>) {
    let mut builder = TreeBuilder::new("file", Some(0));
    let mut id = 1;
    let mut statements = Vec::new();
    for _ in 0..blocks {
        builder.node("block", Some(id), |b| {
            for _ in 0..10 {
                let stmt = b.node("stmt", Some(id + 1), |s| {
                    s.leaf("ident", "name", Some(id + 2));
                    s.leaf("ws", " ", None);
                    s.leaf("punct", ";", Some(id + 3));
                });
                statements.push(stmt);
                id += 4;
            }
        });
        id += 1;
    }
    (Document::new(builder.finish()), statements)
}

// One statement appended to every tenth block
#[divan::bench(args = [10, 100, 1_000])]
fn scattered_inserts(bencher: Bencher, blocks: usize) {
    bencher
        .with_inputs(|| sample(blocks))
        .bench_local_values(|(mut doc, statements)| {
            let mut events: Vec<TreeChangeEvent<u32>> = Vec::new();
            doc.transaction(&mut events, |tx| {
                for &stmt in statements.iter().step_by(100) {
                    let leaf = tx.new_leaf("ident", "new", Some(u32::MAX));
                    tx.insert_after(stmt, leaf)?;
                }
                Ok(())
            })
            .unwrap();
            black_box(events);
        });
}

// Every statement's first token retyped, then the whole file touched at the root
#[divan::bench(args = [10, 100, 1_000])]
fn text_edits_absorbed_by_root(bencher: Bencher, blocks: usize) {
    bencher
        .with_inputs(|| sample(blocks))
        .bench_local_values(|(mut doc, statements)| {
            let root = doc.root();
            let mut events: Vec<TreeChangeEvent<u32>> = Vec::new();
            doc.transaction(&mut events, |tx| {
                for &stmt in &statements {
                    let Some(ident) = tx.tree().nth_child(stmt, 0) else {
                        continue;
                    };
                    tx.set_text(ident, "renamed")?;
                }
                let trailer = tx.new_leaf("ws", "\n", None);
                tx.append_child(root, trailer)
            })
            .unwrap();
            black_box(events);
        });
}

// Many nested transactions, each removing one statement
#[divan::bench(args = [10, 100])]
fn nested_removals(bencher: Bencher, blocks: usize) {
    bencher
        .with_inputs(|| sample(blocks))
        .bench_local_values(|(mut doc, statements)| {
            let mut events: Vec<TreeChangeEvent<u32>> = Vec::new();
            doc.transaction(&mut events, |tx| {
                for &stmt in statements.iter().step_by(3) {
                    let Some(block) = tx.tree().parent(stmt) else {
                        continue;
                    };
                    tx.nested(|tx| tx.remove_child(block, stmt))?;
                }
                Ok(())
            })
            .unwrap();
            black_box(events);
        });
}
