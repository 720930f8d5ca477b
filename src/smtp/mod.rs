/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use smtp_proto::Response;

pub mod auth;
pub mod builder;
pub mod client;
pub mod ehlo;
pub mod envelope;
pub mod message;
pub mod tls;

#[cfg(test)]
pub(crate) mod fake;

pub trait AssertReply: Sized {
    fn is_positive_completion(&self) -> bool;

    /// Fails with [`crate::Error::UnexpectedReply`] unless the reply is 2xx.
    fn assert_positive_completion(self) -> crate::Result<()>;

    /// Fails with [`crate::Error::Rejected`] unless the reply is 2xx.
    fn assert_accepted(self) -> crate::Result<()>;

    /// Fails with [`crate::Error::Rejected`] unless the reply has `code`.
    fn assert_accepted_code(self, code: u16) -> crate::Result<()>;
}

impl AssertReply for Response<String> {
    #[inline(always)]
    fn is_positive_completion(&self) -> bool {
        (200..=299).contains(&self.code)
    }

    fn assert_positive_completion(self) -> crate::Result<()> {
        if self.is_positive_completion() {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply(self))
        }
    }

    fn assert_accepted(self) -> crate::Result<()> {
        if self.is_positive_completion() {
            Ok(())
        } else {
            Err(crate::Error::Rejected(self))
        }
    }

    fn assert_accepted_code(self, code: u16) -> crate::Result<()> {
        if self.code == code {
            Ok(())
        } else {
            Err(crate::Error::Rejected(self))
        }
    }
}
