//! Translation of persisted rows into the value objects the loop consumes.
//!
//! This is where the persistence vocabulary ends: everything downstream of
//! [`assemble`] works on [`Entity`] / [`TransferTemplate`] values. The only
//! non-trivial work is combining an account's growth-model rows into a
//! single model and sorting templates by priority.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::error::AssembleError;
use crate::model::{
    AccountType, BalanceLimit, BalanceSnapshot, CashFlowRule, CombinedGrowth, Entity, EntityId,
    FixedGrowth, GrowthModel, LogNormalGrowth, SpecialDate, TimeFrame, TransferAmount,
    TransferEndpoint, TransferTemplate,
};
use crate::prediction::PredictionInput;
use crate::uncertain::UncertainValue;

/// A persisted account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: String,
    pub name: String,
    pub type_id: Option<String>,
    pub balance_upper_limit: Option<f64>,
    pub cash_flow_frequency: Option<String>,
    pub cash_flow_destination_id: Option<String>,
}

/// A persisted balance observation; `balance` is an encoded uncertain value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub account_id: String,
    pub date: String,
    pub balance: String,
}

/// A persisted growth-model row; rates are encoded uncertain values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthModelRow {
    pub account_id: String,
    pub kind: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub annual_rate: String,
    pub annual_volatility: Option<String>,
}

/// A persisted transfer template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferTemplateRow {
    pub id: String,
    pub name: String,
    /// Empty means an external source.
    pub from_account_id: String,
    /// Empty means an external sink.
    pub to_account_id: String,
    pub amount_kind: String,
    pub amount_fixed: Option<String>,
    pub amount_percent: Option<f64>,
    pub priority: i64,
    pub recurrence: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTypeRow {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialDateRow {
    pub date: String,
    pub name: String,
}

fn parse_date(input: &str) -> Result<Date, AssembleError> {
    input.parse().map_err(|source| AssembleError::InvalidDate {
        input: input.to_string(),
        source,
    })
}

fn parse_optional_date(input: Option<&String>) -> Result<Option<Date>, AssembleError> {
    input.map(|s| parse_date(s)).transpose()
}

fn growth_model(row: &GrowthModelRow) -> Result<GrowthModel, AssembleError> {
    let time_frame = TimeFrame {
        start: parse_optional_date(row.start_date.as_ref())?.unwrap_or(Date::MIN),
        end: parse_optional_date(row.end_date.as_ref())?,
    };
    let annual_rate = UncertainValue::decode(&row.annual_rate)?;
    match row.kind.as_str() {
        "fixed" => Ok(GrowthModel::Fixed(FixedGrowth {
            time_frame,
            annual_rate,
        })),
        "lognormal" => Ok(GrowthModel::LogNormal(LogNormalGrowth {
            time_frame,
            annual_rate,
            annual_volatility: row
                .annual_volatility
                .as_deref()
                .map(UncertainValue::decode)
                .transpose()?,
        })),
        other => Err(AssembleError::UnknownGrowthModelKind(other.to_string())),
    }
}

fn transfer_template(row: &TransferTemplateRow) -> Result<TransferTemplate, AssembleError> {
    let amount = match row.amount_kind.as_str() {
        "fixed" => {
            let encoded = row.amount_fixed.as_deref().unwrap_or("fixed(0)");
            TransferAmount::Fixed(UncertainValue::decode(encoded)?)
        }
        "percent" => TransferAmount::Percent(row.amount_percent.unwrap_or(0.0)),
        other => return Err(AssembleError::UnknownAmountKind(other.to_string())),
    };
    Ok(TransferTemplate {
        id: row.id.clone(),
        name: row.name.clone(),
        from: TransferEndpoint::from_id(&row.from_account_id),
        to: TransferEndpoint::from_id(&row.to_account_id),
        amount,
        priority: row.priority,
        recurrence: row.recurrence.parse()?,
        effective_from: parse_optional_date(row.start_date.as_ref())?.unwrap_or(Date::MIN),
        effective_to: parse_optional_date(row.end_date.as_ref())?,
        enabled: row.enabled,
    })
}

/// Assemble persisted rows into a [`PredictionInput`].
///
/// Accounts with no stored snapshots are dropped; they have no observed
/// balance to project from. Growth rows of the same account combine into a
/// [`CombinedGrowth`] (a single row is used directly). Templates come out
/// sorted by priority ascending, insertion order preserved within a
/// priority.
pub fn assemble(
    accounts: &[AccountRow],
    snapshots: &[SnapshotRow],
    growth_rows: &[GrowthModelRow],
    template_rows: &[TransferTemplateRow],
    type_rows: &[AccountTypeRow],
    special_rows: &[SpecialDateRow],
) -> Result<PredictionInput, AssembleError> {
    let mut entities = Vec::with_capacity(accounts.len());
    for account in accounts {
        let id = EntityId::from(account.id.clone());

        let mut entity_snapshots = Vec::new();
        for row in snapshots.iter().filter(|s| s.account_id == account.id) {
            entity_snapshots.push(BalanceSnapshot {
                date: parse_date(&row.date)?,
                balance: UncertainValue::decode(&row.balance)?,
            });
        }
        entity_snapshots.sort_by_key(|s| s.date);
        if let Some(pair) = entity_snapshots.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(AssembleError::DuplicateSnapshot {
                account: id,
                date: pair[0].date,
            });
        }
        if entity_snapshots.is_empty() {
            continue;
        }

        let mut models = Vec::new();
        for row in growth_rows.iter().filter(|g| g.account_id == account.id) {
            models.push(growth_model(row)?);
        }
        let growth = match models.len() {
            0 => None,
            1 => models.pop(),
            _ => Some(GrowthModel::Combined(CombinedGrowth::new(models))),
        };

        let cash_flow = if account.cash_flow_frequency.is_some()
            || account.cash_flow_destination_id.is_some()
        {
            Some(CashFlowRule {
                recurrence: account
                    .cash_flow_frequency
                    .as_deref()
                    .unwrap_or("*-*-*")
                    .parse()?,
                destination: account
                    .cash_flow_destination_id
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .map(EntityId::from),
            })
        } else {
            None
        };

        entities.push(Entity {
            id,
            name: account.name.clone(),
            type_id: account.type_id.clone(),
            balance_limit: account.balance_upper_limit.map(|upper| BalanceLimit {
                upper: UncertainValue::fixed(upper),
            }),
            snapshots: entity_snapshots,
            growth,
            cash_flow,
        });
    }

    let mut templates = Vec::with_capacity(template_rows.len());
    for row in template_rows {
        templates.push(transfer_template(row)?);
    }
    templates.sort_by_key(|t| t.priority);

    let account_types = type_rows
        .iter()
        .map(|row| AccountType {
            id: row.id.clone(),
            name: row.name.clone(),
            color: row.color.clone(),
        })
        .collect();

    let mut special_dates = Vec::with_capacity(special_rows.len());
    for row in special_rows {
        special_dates.push(SpecialDate {
            date: parse_date(&row.date)?,
            name: row.name.clone(),
        });
    }

    Ok(PredictionInput {
        entities,
        templates,
        account_types,
        special_dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    fn account(id: &str) -> AccountRow {
        AccountRow {
            id: id.to_string(),
            name: format!("Account {id}"),
            type_id: None,
            balance_upper_limit: None,
            cash_flow_frequency: None,
            cash_flow_destination_id: None,
        }
    }

    fn snapshot(account_id: &str, date: &str, balance: &str) -> SnapshotRow {
        SnapshotRow {
            account_id: account_id.to_string(),
            date: date.to_string(),
            balance: balance.to_string(),
        }
    }

    #[test]
    fn test_assemble_basic_entity() {
        let input = assemble(
            &[account("a")],
            &[
                snapshot("a", "2000-06-01", "fixed(200)"),
                snapshot("a", "2000-01-01", "uniform(90,110)"),
            ],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(input.entities.len(), 1);
        let entity = &input.entities[0];
        assert_eq!(entity.snapshots.len(), 2);
        // Sorted ascending by date.
        assert_eq!(entity.snapshots[0].date, date(2000, 1, 1));
        assert_eq!(entity.snapshots[1].date, date(2000, 6, 1));
    }

    #[test]
    fn test_assemble_drops_accounts_without_history() {
        let input = assemble(&[account("a")], &[], &[], &[], &[], &[]).unwrap();
        assert!(input.entities.is_empty());
    }

    #[test]
    fn test_assemble_rejects_duplicate_snapshot_dates() {
        let err = assemble(
            &[account("a")],
            &[
                snapshot("a", "2000-01-01", "fixed(1)"),
                snapshot("a", "2000-01-01", "fixed(2)"),
            ],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, AssembleError::DuplicateSnapshot { .. }));
    }

    #[test]
    fn test_assemble_growth_models() {
        let rows = vec![
            GrowthModelRow {
                account_id: "a".to_string(),
                kind: "lognormal".to_string(),
                start_date: Some("2010-01-01".to_string()),
                end_date: None,
                annual_rate: "fixed(0.05)".to_string(),
                annual_volatility: Some("fixed(0.1)".to_string()),
            },
            GrowthModelRow {
                account_id: "a".to_string(),
                kind: "fixed".to_string(),
                start_date: Some("2000-01-01".to_string()),
                end_date: Some("2010-01-01".to_string()),
                annual_rate: "fixed(0.02)".to_string(),
                annual_volatility: None,
            },
        ];
        let input = assemble(
            &[account("a")],
            &[snapshot("a", "2000-01-01", "fixed(100)")],
            &rows,
            &[],
            &[],
            &[],
        )
        .unwrap();
        let growth = input.entities[0].growth.as_ref().unwrap();
        // Combined and sorted: the fixed model (starting 2000) comes first.
        assert_eq!(growth.starts_on(), date(2000, 1, 1));
        assert!(matches!(growth, GrowthModel::Combined(_)));
    }

    #[test]
    fn test_assemble_single_growth_row_used_directly() {
        let rows = vec![GrowthModelRow {
            account_id: "a".to_string(),
            kind: "fixed".to_string(),
            start_date: None,
            end_date: None,
            annual_rate: "fixed(0.02)".to_string(),
            annual_volatility: None,
        }];
        let input = assemble(
            &[account("a")],
            &[snapshot("a", "2000-01-01", "fixed(100)")],
            &rows,
            &[],
            &[],
            &[],
        )
        .unwrap();
        assert!(matches!(
            input.entities[0].growth,
            Some(GrowthModel::Fixed(_))
        ));
    }

    #[test]
    fn test_assemble_rejects_unknown_growth_kind() {
        let rows = vec![GrowthModelRow {
            account_id: "a".to_string(),
            kind: "martingale".to_string(),
            start_date: None,
            end_date: None,
            annual_rate: "fixed(0.02)".to_string(),
            annual_volatility: None,
        }];
        let err = assemble(
            &[account("a")],
            &[snapshot("a", "2000-01-01", "fixed(100)")],
            &rows,
            &[],
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, AssembleError::UnknownGrowthModelKind(_)));
    }

    #[test]
    fn test_assemble_templates_sorted_by_priority_stable() {
        let rows = vec![
            TransferTemplateRow {
                id: "late".to_string(),
                name: "late".to_string(),
                from_account_id: "".to_string(),
                to_account_id: "a".to_string(),
                amount_kind: "fixed".to_string(),
                amount_fixed: Some("fixed(1)".to_string()),
                amount_percent: None,
                priority: 5,
                recurrence: "*-*-25".to_string(),
                start_date: None,
                end_date: None,
                enabled: true,
            },
            TransferTemplateRow {
                id: "first".to_string(),
                name: "first".to_string(),
                from_account_id: "a".to_string(),
                to_account_id: "".to_string(),
                amount_kind: "percent".to_string(),
                amount_fixed: None,
                amount_percent: Some(0.1),
                priority: 1,
                recurrence: "*-*-25".to_string(),
                start_date: None,
                end_date: None,
                enabled: true,
            },
            TransferTemplateRow {
                id: "second".to_string(),
                name: "second".to_string(),
                from_account_id: "a".to_string(),
                to_account_id: "".to_string(),
                amount_kind: "fixed".to_string(),
                amount_fixed: Some("fixed(2)".to_string()),
                amount_percent: None,
                priority: 1,
                recurrence: "*-*-25".to_string(),
                start_date: None,
                end_date: None,
                enabled: true,
            },
        ];
        let input = assemble(&[], &[], &[], &rows, &[], &[]).unwrap();
        let ids: Vec<&str> = input.templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_assemble_cash_flow_and_limit() {
        let mut row = account("loan");
        row.balance_upper_limit = Some(0.0);
        row.cash_flow_frequency = Some("*-*-01".to_string());
        row.cash_flow_destination_id = Some("checking".to_string());
        let input = assemble(
            &[row],
            &[snapshot("loan", "2000-01-01", "fixed(-1000)")],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap();
        let entity = &input.entities[0];
        let rule = entity.cash_flow.as_ref().unwrap();
        assert_eq!(rule.destination, Some("checking".into()));
        assert!(entity.balance_limit.is_some());
    }

    #[test]
    fn test_assemble_special_dates_and_types() {
        let input = assemble(
            &[],
            &[],
            &[],
            &[],
            &[AccountTypeRow {
                id: "cash".to_string(),
                name: "Cash".to_string(),
                color: Some("#fff".to_string()),
            }],
            &[SpecialDateRow {
                date: "2001-06-15".to_string(),
                name: "move".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(input.account_types.len(), 1);
        assert_eq!(input.special_dates[0].date, date(2001, 6, 15));
    }

    #[test]
    fn test_assemble_rejects_bad_dates_and_values() {
        assert!(matches!(
            assemble(
                &[account("a")],
                &[snapshot("a", "not-a-date", "fixed(1)")],
                &[],
                &[],
                &[],
                &[]
            ),
            Err(AssembleError::InvalidDate { .. })
        ));
        assert!(matches!(
            assemble(
                &[account("a")],
                &[snapshot("a", "2000-01-01", "weird(1)")],
                &[],
                &[],
                &[],
                &[]
            ),
            Err(AssembleError::Uncertain(_))
        ));
    }
}
