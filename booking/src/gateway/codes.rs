//! Vendor error codes, grouped by the call that returns them.
//!
//! Lookup is case-insensitive. A code the table does not know maps to the
//! group's fallback member (`*_MISMATCH_ERROR`, or
//! `VIRTUAL_ACCOUNT_ISSUE_ERROR_CODE` for issuance) instead of failing.

use std::fmt;

macro_rules! gateway_error_codes {
    (
        $(#[$meta:meta])*
        $name:ident, fallback: $fallback:ident = $fallback_code:literal;
        $($variant:ident = $code:literal => $status:literal,)+
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = $code]
                $variant,
            )+
            /// Code not in the table.
            $fallback,
        }

        impl $name {
            /// Every code, fallback last.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+ Self::$fallback];

            /// Vendor spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                    Self::$fallback => $fallback_code,
                }
            }

            /// HTTP status the vendor answers with.
            #[must_use]
            pub const fn http_status(self) -> u16 {
                match self {
                    $(Self::$variant => $status,)+
                    Self::$fallback => 500,
                }
            }

            /// Map a vendor code, falling back to the mismatch member.
            #[must_use]
            pub fn from_code(code: &str) -> Self {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str().eq_ignore_ascii_case(code))
                    .unwrap_or(Self::$fallback)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

gateway_error_codes! {
    /// Errors of `POST /v1/payments/confirm`.
    ConfirmErrorCode, fallback: Mismatch = "PAYMENT_CONFIRM_ERROR_MISMATCH_ERROR";
    AlreadyProcessedPayment = "ALREADY_PROCESSED_PAYMENT" => 400,
    ProviderError = "PROVIDER_ERROR" => 400,
    InvalidRequest = "INVALID_REQUEST" => 400,
    InvalidApiKey = "INVALID_API_KEY" => 400,
    InvalidCardExpiration = "INVALID_CARD_EXPIRATION" => 400,
    InvalidCardNumber = "INVALID_CARD_NUMBER" => 400,
    InvalidCardPassword = "INVALID_CARD_PASSWORD" => 400,
    InvalidCardIdentity = "INVALID_CARD_IDENTITY" => 400,
    InvalidStoppedCard = "INVALID_STOPPED_CARD" => 400,
    InvalidRejectCard = "INVALID_REJECT_CARD" => 400,
    InvalidCardLostOrStolen = "INVALID_CARD_LOST_OR_STOLEN" => 400,
    NotSupportedCardType = "NOT_SUPPORTED_CARD_TYPE" => 400,
    NotRegisteredCardCompany = "NOT_REGISTERED_CARD_COMPANY" => 400,
    InvalidCardInstallmentPlan = "INVALID_CARD_INSTALLMENT_PLAN" => 400,
    NotSupportedMonthlyInstallmentPlan = "NOT_SUPPORTED_MONTHLY_INSTALLMENT_PLAN" => 400,
    NotSupportedInstallmentPlanCardOrMerchant = "NOT_SUPPORTED_INSTALLMENT_PLAN_CARD_OR_MERCHANT" => 400,
    NotSupportedMonthlyInstallmentPlanBelowAmount = "NOT_SUPPORTED_MONTHLY_INSTALLMENT_PLAN_BELOW_AMOUNT" => 400,
    BelowMinimumAmount = "BELOW_MINIMUM_AMOUNT" => 400,
    ExceedMaxDailyPaymentCount = "EXCEED_MAX_DAILY_PAYMENT_COUNT" => 400,
    ExceedMaxPaymentAmount = "EXCEED_MAX_PAYMENT_AMOUNT" => 400,
    DuplicatedOrderId = "DUPLICATED_ORDER_ID" => 400,
    InvalidOrderId = "INVALID_ORDER_ID" => 400,
    UnapprovedOrderId = "UNAPPROVED_ORDER_ID" => 400,
    NotAllowedPointUse = "NOT_ALLOWED_POINT_USE" => 400,
    InvalidRequiredParam = "INVALID_REQUIRED_PARAM" => 400,
    CardProcessingError = "CARD_PROCESSING_ERROR" => 400,
    NotAvailablePayment = "NOT_AVAILABLE_PAYMENT" => 400,
    UnauthorizedKey = "UNAUTHORIZED_KEY" => 401,
    RejectCardPayment = "REJECT_CARD_PAYMENT" => 403,
    RejectAccountPayment = "REJECT_ACCOUNT_PAYMENT" => 403,
    RejectCardCompany = "REJECT_CARD_COMPANY" => 403,
    ExceedMaxAuthCount = "EXCEED_MAX_AUTH_COUNT" => 403,
    ExceedMaxOneDayAmount = "EXCEED_MAX_ONE_DAY_AMOUNT" => 403,
    ForbiddenRequest = "FORBIDDEN_REQUEST" => 403,
    NotAvailableBank = "NOT_AVAILABLE_BANK" => 403,
    InvalidPassword = "INVALID_PASSWORD" => 403,
    IncorrectBasicAuthFormat = "INCORRECT_BASIC_AUTH_FORMAT" => 403,
    FdsError = "FDS_ERROR" => 403,
    NotFoundPayment = "NOT_FOUND_PAYMENT" => 404,
    NotFoundPaymentSession = "NOT_FOUND_PAYMENT_SESSION" => 404,
    FailedPaymentInternalSystemProcessing = "FAILED_PAYMENT_INTERNAL_SYSTEM_PROCESSING" => 500,
    FailedInternalSystemProcessing = "FAILED_INTERNAL_SYSTEM_PROCESSING" => 500,
    FailedDbProcessing = "FAILED_DB_PROCESSING" => 500,
    FailedCardCompanyResponse = "FAILED_CARD_COMPANY_RESPONSE" => 500,
    UnknownPaymentError = "UNKNOWN_PAYMENT_ERROR" => 500,
}

gateway_error_codes! {
    /// Errors of `POST /v1/payments/{paymentKey}/cancel`.
    CancelErrorCode, fallback: Mismatch = "PAYMENT_CANCEL_ERROR_MISMATCH_ERROR";
    AlreadyCanceledPayment = "ALREADY_CANCELED_PAYMENT" => 400,
    InvalidRefundAccountInfo = "INVALID_REFUND_ACCOUNT_INFO" => 400,
    ExceedCancelAmountDiscountAmount = "EXCEED_CANCEL_AMOUNT_DISCOUNT_AMOUNT" => 400,
    InvalidRequest = "INVALID_REQUEST" => 400,
    InvalidRefundAccountNumber = "INVALID_REFUND_ACCOUNT_NUMBER" => 400,
    InvalidBank = "INVALID_BANK" => 400,
    NotMatchesRefundableAmount = "NOT_MATCHES_REFUNDABLE_AMOUNT" => 400,
    ProviderError = "PROVIDER_ERROR" => 400,
    RefundRejected = "REFUND_REJECTED" => 400,
    AlreadyRefundPayment = "ALREADY_REFUND_PAYMENT" => 400,
    ForbiddenBankRefundRequest = "FORBIDDEN_BANK_REFUND_REQUEST" => 400,
    UnauthorizedKey = "UNAUTHORIZED_KEY" => 401,
    NotCancelableAmount = "NOT_CANCELABLE_AMOUNT" => 403,
    ForbiddenConsecutiveRequest = "FORBIDDEN_CONSECUTIVE_REQUEST" => 403,
    ForbiddenRequest = "FORBIDDEN_REQUEST" => 403,
    NotCancelablePayment = "NOT_CANCELABLE_PAYMENT" => 403,
    ExceedMaxRefundDue = "EXCEED_MAX_REFUND_DUE" => 403,
    NotAllowedPartialRefundWaitingDeposit = "NOT_ALLOWED_PARTIAL_REFUND_WAITING_DEPOSIT" => 403,
    NotAllowedPartialRefund = "NOT_ALLOWED_PARTIAL_REFUND" => 403,
    NotAvailableBank = "NOT_AVAILABLE_BANK" => 403,
    IncorrectBasicAuthFormat = "INCORRECT_BASIC_AUTH_FORMAT" => 403,
    NotCancelablePaymentForDormantUser = "NOT_CANCELABLE_PAYMENT_FOR_DORMANT_USER" => 403,
    NotFoundPayment = "NOT_FOUND_PAYMENT" => 404,
    FailedInternalSystemProcessing = "FAILED_INTERNAL_SYSTEM_PROCESSING" => 500,
    FailedRefundProcess = "FAILED_REFUND_PROCESS" => 500,
    FailedMethodHandlingCancel = "FAILED_METHOD_HANDLING_CANCEL" => 500,
    FailedPartialRefund = "FAILED_PARTIAL_REFUND" => 500,
    CommonError = "COMMON_ERROR" => 500,
    FailedPaymentInternalSystemProcessing = "FAILED_PAYMENT_INTERNAL_SYSTEM_PROCESSING" => 500,
}

gateway_error_codes! {
    /// Errors of the payment lookups.
    InquiryErrorCode, fallback: Mismatch = "PAYMENT_INQUIRY_ERROR_MISMATCH_ERROR";
    NotSupportedMonthlyInstallmentPlanBelowAmount = "NOT_SUPPORTED_MONTHLY_INSTALLMENT_PLAN_BELOW_AMOUNT" => 400,
    UnauthorizedKey = "UNAUTHORIZED_KEY" => 401,
    ForbiddenConsecutiveRequest = "FORBIDDEN_CONSECUTIVE_REQUEST" => 403,
    IncorrectBasicAuthFormat = "INCORRECT_BASIC_AUTH_FORMAT" => 403,
    NotFoundPayment = "NOT_FOUND_PAYMENT" => 404,
    NotFound = "NOT_FOUND" => 404,
    FailedPaymentInternalSystemProcessing = "FAILED_PAYMENT_INTERNAL_SYSTEM_PROCESSING" => 500,
}

gateway_error_codes! {
    /// Errors of `POST /v1/virtual-accounts`.
    VirtualAccountIssueErrorCode, fallback: IssueError = "VIRTUAL_ACCOUNT_ISSUE_ERROR_CODE";
    DuplicatedOrderId = "DUPLICATED_ORDER_ID" => 400,
    InvalidRequest = "INVALID_REQUEST" => 400,
    InvalidRegistrationNumberType = "INVALID_REGISTRATION_NUMBER_TYPE" => 400,
    InvalidDate = "INVALID_DATE" => 400,
    InvalidBank = "INVALID_BANK" => 400,
    ExceedMaxDueDate = "EXCEED_MAX_DUE_DATE" => 400,
    UnauthorizedKey = "UNAUTHORIZED_KEY" => 401,
    IncorrectBasicAuthFormat = "INCORRECT_BASIC_AUTH_FORMAT" => 403,
    FailedInternalSystemProcessing = "FAILED_INTERNAL_SYSTEM_PROCESSING" => 500,
    FailedDbProcessing = "FAILED_DB_PROCESSING" => 500,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_their_member() {
        assert_eq!(
            ConfirmErrorCode::from_code("ALREADY_PROCESSED_PAYMENT"),
            ConfirmErrorCode::AlreadyProcessedPayment
        );
        assert_eq!(
            CancelErrorCode::from_code("NOT_CANCELABLE_AMOUNT"),
            CancelErrorCode::NotCancelableAmount
        );
        assert_eq!(InquiryErrorCode::from_code("NOT_FOUND"), InquiryErrorCode::NotFound);
        assert_eq!(ConfirmErrorCode::RejectCardPayment.http_status(), 403);
    }

    #[test]
    fn virtual_account_codes_fall_back_to_issue_error() {
        assert_eq!(
            VirtualAccountIssueErrorCode::from_code("invalid_bank"),
            VirtualAccountIssueErrorCode::InvalidBank
        );
        assert_eq!(
            VirtualAccountIssueErrorCode::from_code("REJECT_CARD_PAYMENT").as_str(),
            "VIRTUAL_ACCOUNT_ISSUE_ERROR_CODE"
        );
        assert_eq!(VirtualAccountIssueErrorCode::UnauthorizedKey.http_status(), 401);
    }

    #[test]
    fn lookup_ignores_case() {
        for raw in ["INVALID_REQUEST", "invalid_request", "Invalid_Request"] {
            assert_eq!(ConfirmErrorCode::from_code(raw), ConfirmErrorCode::InvalidRequest);
        }
    }

    #[test]
    fn unknown_codes_fall_back_to_mismatch() {
        assert_eq!(ConfirmErrorCode::from_code("SOMETHING_NEW"), ConfirmErrorCode::Mismatch);
        assert_eq!(
            CancelErrorCode::from_code("UNKNOWN_CANCEL_ERROR").as_str(),
            "PAYMENT_CANCEL_ERROR_MISMATCH_ERROR"
        );
        assert_eq!(
            InquiryErrorCode::from_code("").to_string(),
            "PAYMENT_INQUIRY_ERROR_MISMATCH_ERROR"
        );
    }
}
