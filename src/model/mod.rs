// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! S4 identity storage model

mod data_type;
pub(crate) mod identity_information;
pub(crate) mod identity_unlock;
pub(crate) mod previous_identity;
mod readable_vector;
mod scrypt_config;
mod settings;
pub(crate) mod storage;
mod writable_datablock;

pub use data_type::DataType;
pub use previous_identity::MAX_PREVIOUS_IDENTITIES;
pub use settings::{IdentitySettings, OptionFlags};
pub use storage::{BINARY_HEADER, TEXTUAL_HEADER};
