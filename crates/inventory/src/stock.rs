//! Stock invariant check.

use ledger_store::MovementKind;

/// Outcome of applying a movement to a stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockCheck {
    pub new_quantity: i64,
    pub ok: bool,
}

/// Applies `delta` units of `kind` to `current`.
///
/// Inbound movements pass unless the stock level would overflow; on
/// overflow the quantity is reported unchanged. Outbound movements pass
/// only if the resulting quantity is not negative. `delta` is expected to
/// be positive; callers validate it first.
pub fn check(current: i64, kind: MovementKind, delta: i64) -> StockCheck {
    match kind {
        MovementKind::In => match current.checked_add(delta) {
            Some(new_quantity) => StockCheck {
                new_quantity,
                ok: true,
            },
            None => StockCheck {
                new_quantity: current,
                ok: false,
            },
        },
        MovementKind::Out => {
            let new_quantity = current - delta;
            StockCheck {
                new_quantity,
                ok: new_quantity >= 0,
            }
        }
    }
}
