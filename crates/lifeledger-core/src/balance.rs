//! Balance recalculation engine
//!
//! Pure functions over a ledger snapshot. Every entry point is
//! idempotent and order-independent (the sums are commutative), so it is
//! always safe to re-run them to recover from a transient inconsistency
//! such as a failed partial sync.

use rust_decimal::Decimal;

use crate::model::{DebtLoan, PaymentMethod, Transaction};

/// Running balance of one payment method
///
/// `initial_balance` plus the signed effect of every transaction that
/// references the method. Transactions referencing other methods (or
/// none) are ignored.
pub fn method_balance<'a, I>(method: &PaymentMethod, transactions: I) -> Decimal
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let net: Decimal = transactions
        .into_iter()
        .filter(|tx| tx.payment_method_id == method.id)
        .map(Transaction::effect)
        .sum();
    method.initial_balance + net
}

/// Aggregate balance across the whole ledger
///
/// Sum of every payment method's running balance, plus the signed
/// contribution of every unpaid debt/loan. Debt/loans never touch an
/// individual method balance.
pub fn total_balance<'a, M, D>(methods: M, debt_loans: D) -> Decimal
where
    M: IntoIterator<Item = &'a PaymentMethod>,
    D: IntoIterator<Item = &'a DebtLoan>,
{
    let methods_total: Decimal = methods.into_iter().map(|m| m.current_balance).sum();
    let open_total: Decimal = debt_loans.into_iter().map(DebtLoan::aggregate_effect).sum();
    methods_total + open_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_entity_id, FlowKind};
    use chrono::Utc;

    fn method(id: &str, initial: i64) -> PaymentMethod {
        PaymentMethod {
            id: id.to_string(),
            name: id.to_string(),
            icon: String::new(),
            color: String::new(),
            initial_balance: Decimal::from(initial),
            current_balance: Decimal::from(initial),
            keywords: Vec::new(),
            updated_at: None,
        }
    }

    fn tx(method_id: &str, amount: i64, kind: FlowKind) -> Transaction {
        Transaction {
            id: new_entity_id(),
            amount: Decimal::from(amount),
            date: Utc::now(),
            description: String::new(),
            category_id: "cat-food".to_string(),
            payment_method_id: method_id.to_string(),
            kind,
            updated_at: None,
        }
    }

    fn debt(amount: i64, is_debt: bool, is_paid: bool) -> DebtLoan {
        DebtLoan {
            id: new_entity_id(),
            person_name: "Sam".to_string(),
            amount: Decimal::from(amount),
            is_debt,
            is_paid,
            due_date: None,
            payment_method_id: None,
            notes: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_method_balance_cash_scenario() {
        // cash starts at 1000; expense 100 -> 900; income 50 -> 950
        let cash = method("cash", 1000);
        let expense = tx("cash", 100, FlowKind::Expense);
        let income = tx("cash", 50, FlowKind::Income);

        let txs = vec![expense.clone(), income.clone()];
        assert_eq!(method_balance(&cash, &txs), Decimal::from(950));

        // deleting the expense returns 1050
        let txs = vec![income];
        assert_eq!(method_balance(&cash, &txs), Decimal::from(1050));
    }

    #[test]
    fn test_method_balance_ignores_other_methods() {
        let cash = method("cash", 100);
        let txs = vec![tx("card", 40, FlowKind::Expense)];
        assert_eq!(method_balance(&cash, &txs), Decimal::from(100));
    }

    #[test]
    fn test_method_balance_order_independent() {
        let cash = method("cash", 0);
        let mut txs = vec![
            tx("cash", 10, FlowKind::Income),
            tx("cash", 25, FlowKind::Expense),
            tx("cash", 40, FlowKind::Income),
        ];
        let forward = method_balance(&cash, &txs);
        txs.reverse();
        assert_eq!(method_balance(&cash, &txs), forward);
        assert_eq!(forward, Decimal::from(25));
    }

    #[test]
    fn test_total_balance_with_debt_loans() {
        let methods = vec![method("cash", 1000), method("card", 500)];
        let debts = vec![debt(200, true, false)];
        assert_eq!(
            total_balance(&methods, &debts),
            Decimal::from(1300)
        );

        // a paid debt stops contributing, no method balance changes
        let debts = vec![debt(200, true, true)];
        assert_eq!(total_balance(&methods, &debts), Decimal::from(1500));

        // money owed to the user increases the total
        let debts = vec![debt(300, false, false)];
        assert_eq!(total_balance(&methods, &debts), Decimal::from(1800));
    }

    #[test]
    fn test_total_balance_empty_ledger() {
        let methods: Vec<PaymentMethod> = Vec::new();
        let debts: Vec<DebtLoan> = Vec::new();
        assert_eq!(total_balance(&methods, &debts), Decimal::ZERO);
    }
}
