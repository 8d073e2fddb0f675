//! Standard entry class codes, transaction codes and return reason codes.

use serde::{Deserialize, Serialize};

use crate::domain::AccountType;

/// Standard entry class for a batch. PPD covers consumer entries, CCD
/// corporate ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecCode {
    Ppd,
    Ccd,
}

impl SecCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecCode::Ppd => "PPD",
            SecCode::Ccd => "CCD",
        }
    }
}

/// Direction of funds relative to the receiving account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDirection {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionCode(pub u8);

#[derive(Debug, thiserror::Error)]
#[error("no transaction code for {account_type:?} {direction:?} (prenote: {prenote})")]
pub struct UnsupportedTransaction {
    pub account_type: AccountType,
    pub direction: EntryDirection,
    pub prenote: bool,
}

/// Selects the transaction code for the receiving account type, direction
/// and live-versus-prenotification status.
pub fn transaction_code(
    account_type: AccountType,
    direction: EntryDirection,
    prenote: bool,
) -> Result<TransactionCode, UnsupportedTransaction> {
    use AccountType::*;
    use EntryDirection::*;
    let code = match (account_type, direction, prenote) {
        (Checking, Credit, false) => 22,
        (Checking, Credit, true) => 23,
        (Checking, Debit, false) => 27,
        (Checking, Debit, true) => 28,
        (Savings, Credit, false) => 32,
        (Savings, Credit, true) => 33,
        (Savings, Debit, false) => 37,
        (Savings, Debit, true) => 38,
        (Loan, Credit, false) => 52,
        (Loan, Credit, true) => 53,
        (Loan, Debit, false) => 55,
        (Loan, Debit, true) => {
            return Err(UnsupportedTransaction {
                account_type,
                direction,
                prenote,
            })
        }
    };
    Ok(TransactionCode(code))
}

/// A return reason code with its published meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnCode {
    pub code: String,
    pub reason: String,
    pub description: String,
}

/// Looks up a NACHA return reason code.
pub fn lookup_return_code(code: &str) -> Option<ReturnCode> {
    let (reason, description) = match code {
        "R01" => ("Insufficient Funds", "Available balance is not sufficient to cover the dollar value of the debit entry"),
        "R02" => ("Account Closed", "Previously active account has been closed by customer or RDFI"),
        "R03" => ("No Account/Unable to Locate Account", "Account number structure is valid but does not match individual identified in entry"),
        "R04" => ("Invalid Account Number", "Account number structure is not valid"),
        "R05" => ("Unauthorized Debit to Consumer Account", "A CCD or CTX debit entry was transmitted to a consumer account and was not authorized"),
        "R06" => ("Returned per ODFI's Request", "ODFI has requested RDFI to return the entry"),
        "R07" => ("Authorization Revoked by Customer", "Consumer who previously authorized entries has revoked authorization"),
        "R08" => ("Payment Stopped", "Receiver has placed a stop payment order on this entry"),
        "R09" => ("Uncollected Funds", "Sufficient ledger balance exists but the available balance is below the dollar value of the entry"),
        "R10" => ("Customer Advises Not Authorized", "Receiver has advised RDFI that originator is not authorized to debit the account"),
        "R11" => ("Check Truncation Entry Return", "Used when returning a check truncation entry"),
        "R12" => ("Branch Sold to Another DFI", "Financial institution receives entry destined for an account at a branch that has been sold"),
        "R13" => ("RDFI not qualified to participate", "Financial institution does not receive commercial ACH entries"),
        "R14" => ("Representative payee deceased", "The representative payee is deceased or unable to continue in that capacity"),
        "R15" => ("Beneficiary or bank account holder deceased", "The beneficiary or account holder is deceased"),
        "R16" => ("Bank account frozen", "Funds are unavailable due to action by the RDFI or a legal order"),
        "R17" => ("File record edit criteria", "Entry with invalid account number initiated under questionable circumstances"),
        "R20" => ("Non-payment bank account", "Entry destined for a non-payment bank account"),
        "R23" => ("Credit entry refused by receiver", "Receiver returned the credit entry"),
        "R24" => ("Duplicate entry", "RDFI has received a duplicate entry"),
        "R29" => ("Corporate customer advises not authorized", "Corporate receiver has notified RDFI that the entry is not authorized"),
        "R31" => ("Permissible return entry", "RDFI may return a CCD or CTX entry the ODFI agrees to accept"),
        "R33" => ("Return of XCK entry", "RDFI determines at its sole discretion to return an XCK entry"),
        _ => return None,
    };
    Some(ReturnCode {
        code: code.to_string(),
        reason: reason.to_string(),
        description: description.to_string(),
    })
}
